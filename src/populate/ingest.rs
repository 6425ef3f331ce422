use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use super::failures::GameRef;
use super::media::{MediaOutcome, MediaUploader};
use super::resolver::RelationResolver;
use crate::cms::{CmsEntity, CmsError, CmsStore, EntityKind};
use crate::normalization::GameDraft;
use crate::storefront::{GameDetail, ListingRecord, Storefront};

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub concurrency: usize,
    pub gallery_limit: usize,
    pub game_delay: Duration,
    pub rating: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            gallery_limit: 5,
            game_delay: Duration::ZERO,
            rating: "BR0".to_string(),
        }
    }
}

/// Why a game was not created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The CMS answered with a 4xx, usually a validation error.
    Rejected,
    /// Transport, upstream or parse error.
    Failed,
}

impl FailureKind {
    pub fn classify(err: &anyhow::Error) -> Self {
        let rejected = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<CmsError>())
            .any(CmsError::is_rejection);
        if rejected {
            Self::Rejected
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameFailure {
    pub title: String,
    pub kind: FailureKind,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub created: Vec<CmsEntity>,
    /// Titles that already existed or repeated within the page.
    pub skipped: Vec<String>,
    pub failed: Vec<GameFailure>,
    pub images_attempted: usize,
    pub images_failed: usize,
}

enum GameOutcome {
    Created(CmsEntity, MediaOutcome),
    Skipped,
}

/// Creates game records that do not exist yet, with relations and media.
///
/// Each listing record runs in its own isolation boundary: an error while
/// resolving relations, scraping the detail page or creating the record fails
/// that game only.
pub struct Ingestor {
    cms: Arc<dyn CmsStore>,
    storefront: Arc<dyn Storefront>,
    resolver: Arc<RelationResolver>,
    media: Arc<MediaUploader>,
    settings: IngestSettings,
    attempted: Mutex<HashSet<String>>,
}

impl Ingestor {
    pub fn new(
        cms: Arc<dyn CmsStore>,
        storefront: Arc<dyn Storefront>,
        resolver: Arc<RelationResolver>,
        media: Arc<MediaUploader>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            cms,
            storefront,
            resolver,
            media,
            settings,
            attempted: Mutex::new(HashSet::new()),
        }
    }

    pub async fn ingest(&self, listing: Vec<ListingRecord>) -> IngestReport {
        let concurrency = self.settings.concurrency.max(1);
        let results: Vec<(String, Result<GameOutcome>)> = stream::iter(listing)
            .map(|rec| async move {
                let title = rec.title.clone();
                (title, self.ingest_one(rec).await)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = IngestReport::default();
        for (title, res) in results {
            match res {
                Ok(GameOutcome::Created(game, media)) => {
                    report.images_attempted += media.attempted;
                    report.images_failed += media.failed;
                    report.created.push(game);
                }
                Ok(GameOutcome::Skipped) => report.skipped.push(title),
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    let error = format!("{e:#}");
                    error!(game = %title, ?kind, error = %error, "game ingestion failed");
                    report.failed.push(GameFailure { title, kind, error });
                }
            }
        }
        report
    }

    /// First caller per title wins for the rest of the run.
    fn claim(&self, title: &str) -> bool {
        self.attempted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(title.to_string())
    }

    #[instrument(skip_all, fields(game = %rec.title))]
    async fn ingest_one(&self, rec: ListingRecord) -> Result<GameOutcome> {
        if !self.claim(&rec.title) {
            return Ok(GameOutcome::Skipped);
        }
        if self
            .cms
            .find_by_name(EntityKind::Game, &rec.title)
            .await
            .context("checking for existing game")?
            .is_some()
        {
            return Ok(GameOutcome::Skipped);
        }

        info!("Creating: {}...", rec.title);
        let draft = GameDraft::from_listing(&rec);
        let r = &self.resolver;
        let (categories, platforms, developer, publisher, detail) = tokio::try_join!(
            r.resolve_all(&draft.categories, EntityKind::Category),
            r.resolve_all(&draft.platforms, EntityKind::Platform),
            r.resolve_opt(draft.developer.as_deref(), EntityKind::Developer),
            r.resolve_opt(draft.publisher.as_deref(), EntityKind::Publisher),
            async {
                self.storefront
                    .fetch_game_detail(&draft.source_slug)
                    .await
                    .context("fetching detail page")
            },
        )?;

        let data = game_payload(
            &draft,
            &self.settings.rating,
            &detail,
            &categories,
            &platforms,
            developer.as_ref(),
            publisher.as_ref(),
        );
        let game = self
            .cms
            .create(EntityKind::Game, data)
            .await
            .context("creating game")?;

        let game_ref = GameRef::new(&game, &draft.slug);
        let media = self
            .media
            .upload_game_media(
                &game_ref,
                draft.cover.as_deref(),
                &draft.gallery,
                self.settings.gallery_limit,
            )
            .await;

        if !self.settings.game_delay.is_zero() {
            tokio::time::sleep(self.settings.game_delay).await;
        }
        Ok(GameOutcome::Created(game, media))
    }
}

fn ids(entities: &[CmsEntity]) -> Vec<i64> {
    entities.iter().map(|e| e.id).collect()
}

/// Field map for the game create call, relations by id.
pub fn game_payload(
    draft: &GameDraft,
    rating: &str,
    detail: &GameDetail,
    categories: &[CmsEntity],
    platforms: &[CmsEntity],
    developer: Option<&CmsEntity>,
    publisher: Option<&CmsEntity>,
) -> Value {
    json!({
        "name": draft.name,
        "slug": draft.slug,
        "price": draft.price,
        "release_date": draft.release_date,
        "rating": rating,
        "short_description": detail.short_description,
        "description": detail.description,
        "categories": ids(categories),
        "platforms": ids(platforms),
        "developers": developer.map(|d| vec![d.id]).unwrap_or_default(),
        "publisher": publisher.map(|p| p.id),
    })
}
