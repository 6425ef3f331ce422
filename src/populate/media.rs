use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::failures::{FailureLog, FailureRecord, GameRef};
use crate::cms::{CmsStore, EntityKind, MediaField, MediaUpload};
use crate::config::{ImageEncoding, MAX_GALLERY_IMAGES};
use crate::normalization::image_url;
use crate::storefront::Storefront;
use crate::util::pacing::Pacer;

/// Counts for one game's media pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaOutcome {
    pub attempted: usize,
    pub failed: usize,
}

/// Downloads storefront images and re-uploads them to the CMS media field.
///
/// Failures never escape: they are logged and appended to the run's
/// [`FailureLog`]. Concurrency is bounded by a semaphore, request rate by the
/// [`Pacer`].
pub struct MediaUploader {
    storefront: Arc<dyn Storefront>,
    cms: Arc<dyn CmsStore>,
    pacer: Pacer,
    permits: Semaphore,
    encoding: ImageEncoding,
    failures: FailureLog,
}

impl MediaUploader {
    pub fn new(
        storefront: Arc<dyn Storefront>,
        cms: Arc<dyn CmsStore>,
        pacer: Pacer,
        concurrency: usize,
        encoding: ImageEncoding,
        failures: FailureLog,
    ) -> Self {
        Self {
            storefront,
            cms,
            pacer,
            permits: Semaphore::new(concurrency.max(1)),
            encoding,
            failures,
        }
    }

    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Upload one image; on error record a [`FailureRecord`] and return false.
    pub async fn upload(&self, image: &str, game: &GameRef, field: MediaField) -> bool {
        match self.try_upload(image, game, field).await {
            Ok(()) => true,
            Err(e) => {
                warn!(game = %game.name, id = game.id, %field, image, error = %format!("{e:#}"), "image upload failed");
                self.failures
                    .push(FailureRecord::new(game.clone(), image, field, &e))
                    .await;
                false
            }
        }
    }

    /// Upload one image and report the error instead of recording it.
    pub async fn try_upload(&self, image: &str, game: &GameRef, field: MediaField) -> Result<()> {
        let url = image_url(image).ok_or_else(|| anyhow!("empty image reference"))?;
        let _permit = self
            .permits
            .acquire()
            .await
            .context("upload semaphore closed")?;

        self.pacer.wait_turn().await;
        let body = self
            .storefront
            .fetch_image(&url)
            .await
            .with_context(|| format!("downloading {url}"))?;
        self.pacer.settle_after_fetch().await;
        let bytes = decode_body(body, self.encoding)?;
        self.pacer.settle_before_send().await;

        let filename = format!("{}.jpg", game.slug);
        info!(%field, file = %filename, "uploading image");
        self.cms
            .upload(MediaUpload {
                ref_id: game.id,
                kind: EntityKind::Game,
                field,
                filename,
                bytes,
            })
            .await
            .with_context(|| format!("uploading {field} for game {}", game.id))?;
        Ok(())
    }

    /// Cover first, then up to `gallery_limit` gallery images concurrently.
    /// The gallery never exceeds [`MAX_GALLERY_IMAGES`] whatever the limit.
    pub async fn upload_game_media(
        &self,
        game: &GameRef,
        cover: Option<&str>,
        gallery: &[String],
        gallery_limit: usize,
    ) -> MediaOutcome {
        let mut outcome = MediaOutcome::default();
        if let Some(cover) = cover {
            outcome.attempted += 1;
            if !self.upload(cover, game, MediaField::Cover).await {
                outcome.failed += 1;
            }
        }

        let shots = gallery.iter().take(gallery_limit.min(MAX_GALLERY_IMAGES));
        let results = join_all(shots.map(|img| self.upload(img, game, MediaField::Gallery))).await;
        outcome.attempted += results.len();
        outcome.failed += results.iter().filter(|ok| !**ok).count();
        outcome
    }
}

fn decode_body(body: Bytes, encoding: ImageEncoding) -> Result<Bytes> {
    match encoding {
        ImageEncoding::Raw => Ok(body),
        ImageEncoding::Base64 => {
            let text: Vec<u8> = body.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(text)
                .context("image body is not valid base64")?;
            Ok(Bytes::from(decoded))
        }
    }
}
