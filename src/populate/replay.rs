use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::failures::FailureRecord;
use super::media::MediaUploader;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub attempted: usize,
    pub recovered: usize,
    /// Records whose single replay also failed, with the latest error.
    pub still_failing: Vec<FailureRecord>,
}

/// Re-run the upload step once per record. No backoff, no second pass, and
/// nothing is appended to the uploader's failure log.
pub async fn replay_failures(uploader: &MediaUploader, failures: Vec<FailureRecord>) -> ReplayReport {
    if failures.is_empty() {
        return ReplayReport::default();
    }
    info!(count = failures.len(), "replaying failed image uploads");

    let attempts = failures.into_iter().map(|record| async move {
        info!(
            name = %record.game.name,
            id = record.game.id,
            field = %record.field,
            "replaying upload"
        );
        match uploader
            .try_upload(&record.image, &record.game, record.field)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                warn!(name = %record.game.name, image = %record.image, error = %format!("{e:#}"), "replay failed");
                Some(FailureRecord::new(
                    record.game.clone(),
                    &record.image,
                    record.field,
                    &e,
                ))
            }
        }
    });
    let results = join_all(attempts).await;

    let attempted = results.len();
    let still_failing: Vec<FailureRecord> = results.into_iter().flatten().collect();
    ReplayReport {
        attempted,
        recovered: attempted - still_failing.len(),
        still_failing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::{CmsStore, EntityKind, InMemoryCms, MediaField};
    use crate::config::ImageEncoding;
    use crate::populate::failures::{FailureLog, GameRef};
    use crate::populate::testing::FakeStorefront;
    use crate::util::pacing::Pacer;
    use std::sync::Arc;

    fn setup() -> (Arc<FakeStorefront>, Arc<InMemoryCms>, MediaUploader, GameRef) {
        let storefront = Arc::new(FakeStorefront::default());
        let cms = Arc::new(InMemoryCms::new());
        let game = cms.seed(EntityKind::Game, "Gwent");
        let uploader = MediaUploader::new(
            storefront.clone(),
            cms.clone() as Arc<dyn CmsStore>,
            Pacer::disabled(),
            2,
            ImageEncoding::Raw,
            FailureLog::default(),
        );
        (storefront, cms, uploader, GameRef::new(&game, "gwent"))
    }

    #[tokio::test]
    async fn each_failure_is_replayed_exactly_once() {
        let (storefront, cms, uploader, game) = setup();
        storefront.fail_image("https://img/a.jpg");
        storefront.fail_image("https://img/b.jpg");
        uploader.upload("//img/a", &game, MediaField::Cover).await;
        uploader.upload("//img/b", &game, MediaField::Gallery).await;
        let recorded = uploader.failures().take().await;
        assert_eq!(recorded.len(), 2);

        storefront.heal_images();
        let report = replay_failures(&uploader, recorded).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.recovered, 2);
        assert!(report.still_failing.is_empty());
        let hits = |u: &str| storefront.image_requests().iter().filter(|r| *r == u).count();
        assert_eq!(hits("https://img/a.jpg"), 2);
        assert_eq!(hits("https://img/b.jpg"), 2);
        assert_eq!(cms.uploads().len(), 2);
    }

    #[tokio::test]
    async fn replay_failures_are_not_collected_again() {
        let (storefront, _cms, uploader, game) = setup();
        storefront.fail_image("https://img/a.jpg");
        uploader.upload("//img/a", &game, MediaField::Cover).await;
        let recorded = uploader.failures().take().await;

        let report = replay_failures(&uploader, recorded).await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.recovered, 0);
        assert_eq!(report.still_failing.len(), 1);
        assert!(uploader.failures().is_empty().await);
        assert_eq!(storefront.image_requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_input_does_nothing() {
        let (storefront, _cms, uploader, _game) = setup();
        let report = replay_failures(&uploader, Vec::new()).await;
        assert_eq!(report.attempted, 0);
        assert!(storefront.image_requests().is_empty());
    }
}
