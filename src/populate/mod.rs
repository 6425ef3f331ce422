//! Batch populate pipeline: listing → relations → games → media → replay.

pub mod failures;
pub mod ingest;
pub mod keyed_lock;
pub mod media;
pub mod replay;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cms::{CmsStore, StrapiClient};
use crate::config::PopulateConfig;
use crate::storefront::{GogClient, ListingParams, Storefront};
use crate::util::pacing::Pacer;
use failures::FailureLog;
use ingest::{GameFailure, IngestSettings, Ingestor};
use media::MediaUploader;
use replay::{replay_failures, ReplayReport};
use resolver::RelationResolver;

/// What one batch run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulateSummary {
    pub page: Option<String>,
    pub fetched: usize,
    pub considered: usize,
    pub created: Vec<String>,
    pub skipped: usize,
    pub failed: Vec<GameFailure>,
    pub relations_created: usize,
    pub images_attempted: usize,
    pub images_failed: usize,
    pub replay: ReplayReport,
}

/// Entry point shared by the HTTP action and the CLI.
///
/// Appends to and replays of the failure log are serialized per service.
/// Separate processes must not share one `FAILURE_LOG`.
pub struct PopulateService {
    config: PopulateConfig,
    storefront: Arc<dyn Storefront>,
    cms: Arc<dyn CmsStore>,
    failure_log_lock: Mutex<()>,
}

impl PopulateService {
    /// Batch and gallery limits above their ceilings are capped here.
    pub fn new(config: PopulateConfig, storefront: Arc<dyn Storefront>, cms: Arc<dyn CmsStore>) -> Self {
        Self {
            config: config.capped(),
            storefront,
            cms,
            failure_log_lock: Mutex::new(()),
        }
    }

    /// GOG storefront plus the configured Strapi CMS.
    pub fn from_config(config: PopulateConfig) -> Result<Self> {
        let storefront = GogClient::new(&config.gog_base_url, config.http_timeout)?;
        let cms = StrapiClient::new(&config.cms_url, config.cms_api_token.clone(), config.http_timeout)?;
        Ok(Self::new(config, Arc::new(storefront), Arc::new(cms)))
    }

    pub fn config(&self) -> &PopulateConfig {
        &self.config
    }

    fn uploader(&self, failures: FailureLog) -> MediaUploader {
        let cfg = &self.config;
        MediaUploader::new(
            self.storefront.clone(),
            self.cms.clone(),
            Pacer::new(cfg.upload_rps, cfg.upload_pre_delay, cfg.upload_post_delay),
            cfg.upload_concurrency,
            cfg.image_encoding,
            failures,
        )
    }

    /// Run one batch over a single listing page.
    ///
    /// `overrides` are merged over `mediaType=game&sort=popularity&page=1`.
    /// Per-game and per-image errors are reported in the summary; only a failed
    /// listing fetch is returned as an error.
    pub async fn populate<I, K, V>(&self, overrides: I) -> Result<PopulateSummary>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = ListingParams::default().with_overrides(overrides);
        info!(params = ?params.pairs().collect::<Vec<_>>(), "Starting to populate...");

        let mut listing = self
            .storefront
            .fetch_listing(&params)
            .await
            .context("fetching storefront listing")?;
        let fetched = listing.len();
        listing.truncate(self.config.listing_limit);

        let failures = FailureLog::default();
        let uploader = Arc::new(self.uploader(failures.clone()));
        let resolver = Arc::new(RelationResolver::new(self.cms.clone()));
        let ingestor = Ingestor::new(
            self.cms.clone(),
            self.storefront.clone(),
            resolver.clone(),
            uploader.clone(),
            IngestSettings {
                concurrency: self.config.game_concurrency,
                gallery_limit: self.config.gallery_limit,
                game_delay: self.config.game_delay,
                rating: self.config.default_rating.clone(),
            },
        );

        let considered = listing.len();
        let report = ingestor.ingest(listing).await;

        let recorded = failures.take().await;
        let replay = replay_failures(&uploader, recorded).await;
        if let Some(path) = &self.config.failure_log {
            self.persist_leftovers(path, &replay).await;
        }

        let summary = PopulateSummary {
            page: params.get("page").map(str::to_string),
            fetched,
            considered,
            created: report.created.iter().map(|g| g.name.clone()).collect(),
            skipped: report.skipped.len(),
            failed: report.failed,
            relations_created: resolver.created_count(),
            images_attempted: report.images_attempted,
            images_failed: report.images_failed,
            replay,
        };
        info!(
            page = ?summary.page,
            fetched = summary.fetched,
            created = summary.created.len(),
            skipped = summary.skipped,
            failed = summary.failed.len(),
            relations_created = summary.relations_created,
            images_failed = summary.images_failed,
            replay_recovered = summary.replay.recovered,
            replay_still_failing = summary.replay.still_failing.len(),
            "Finished populating"
        );
        Ok(summary)
    }

    async fn persist_leftovers(&self, path: &Path, replay: &ReplayReport) {
        if replay.still_failing.is_empty() {
            return;
        }
        let _log = self.failure_log_lock.lock().await;
        match failures::append_ndjson(path, &replay.still_failing).await {
            Ok(()) => info!(
                path = %path.display(),
                count = replay.still_failing.len(),
                "persisted unrecovered image failures"
            ),
            Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "could not persist failure log"),
        }
    }

    /// Replay a persisted failure log once; rewrite it with what still fails.
    pub async fn replay_failure_log(&self, path: &Path) -> Result<ReplayReport> {
        let _log = self.failure_log_lock.lock().await;
        let records = failures::load_ndjson(path).await?;
        if records.is_empty() {
            info!(path = %path.display(), "failure log empty; nothing to replay");
            return Ok(ReplayReport::default());
        }
        let uploader = self.uploader(FailureLog::default());
        let report = replay_failures(&uploader, records).await;
        failures::rewrite_ndjson(path, &report.still_failing).await?;
        info!(
            path = %path.display(),
            attempted = report.attempted,
            recovered = report.recovered,
            "failure log replayed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::{EntityKind, InMemoryCms};
    use testing::{product, FakeStorefront};

    fn service(storefront: Arc<FakeStorefront>, cms: Arc<InMemoryCms>, cfg: PopulateConfig) -> PopulateService {
        PopulateService::new(cfg, storefront, cms)
    }

    fn quiet_config() -> PopulateConfig {
        PopulateConfig {
            upload_rps: 0,
            ..PopulateConfig::default()
        }
    }

    #[tokio::test]
    async fn two_new_one_existing_creates_two() {
        let storefront = Arc::new(FakeStorefront::with_listing(vec![
            product("Gwent", "gwent"),
            product("Thronebreaker", "thronebreaker"),
            product("The Witcher", "the_witcher"),
        ]));
        let cms = Arc::new(InMemoryCms::new());
        cms.seed(EntityKind::Game, "The Witcher");

        let summary = service(storefront, cms.clone(), quiet_config())
            .populate(Vec::<(String, String)>::new())
            .await
            .unwrap();

        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.created.len(), 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(cms.create_calls(EntityKind::Game), 2);
    }

    #[tokio::test]
    async fn overrides_reach_the_listing_request() {
        let storefront = Arc::new(FakeStorefront::default());
        let svc = service(storefront.clone(), Arc::new(InMemoryCms::new()), quiet_config());

        let summary = svc
            .populate([("page", "4"), ("sort", "date"), ("price", "discounted")])
            .await
            .unwrap();

        let sent = &storefront.listing_requests()[0];
        assert_eq!(sent.get("mediaType"), Some("game"));
        assert_eq!(sent.get("page"), Some("4"));
        assert_eq!(sent.get("sort"), Some("date"));
        assert_eq!(sent.get("price"), Some("discounted"));
        assert_eq!(summary.page.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn listing_is_capped() {
        let products = (0..60)
            .map(|i| product(&format!("Game {i}"), &format!("game_{i}")))
            .collect();
        let storefront = Arc::new(FakeStorefront::with_listing(products));
        let cms = Arc::new(InMemoryCms::new());
        let cfg = PopulateConfig {
            gallery_limit: 0,
            ..quiet_config()
        };

        let summary = service(storefront, cms.clone(), cfg)
            .populate(Vec::<(String, String)>::new())
            .await
            .unwrap();

        assert_eq!(summary.fetched, 60);
        assert_eq!(summary.considered, 50);
        assert_eq!(cms.create_calls(EntityKind::Game), 50);
    }

    #[tokio::test]
    async fn raised_limits_cannot_exceed_the_ceilings() {
        let products = (0..60)
            .map(|i| product(&format!("Game {i}"), &format!("game_{i}")))
            .collect();
        let storefront = Arc::new(FakeStorefront::with_listing(products));
        let cms = Arc::new(InMemoryCms::new());
        let cfg = PopulateConfig {
            listing_limit: 60,
            gallery_limit: 7,
            ..quiet_config()
        };

        let summary = service(storefront, cms.clone(), cfg)
            .populate(Vec::<(String, String)>::new())
            .await
            .unwrap();

        assert_eq!(summary.considered, 50);
        assert_eq!(cms.create_calls(EntityKind::Game), 50);
        let uploads = cms.uploads();
        for game in cms.entities(EntityKind::Game) {
            let gallery = uploads
                .iter()
                .filter(|u| u.ref_id == game.id && u.field == crate::cms::MediaField::Gallery)
                .count();
            assert_eq!(gallery, 5, "gallery uploads for {}", game.name);
        }
    }

    #[tokio::test]
    async fn throwing_download_still_completes_and_is_replayed_once() {
        let storefront = Arc::new(FakeStorefront::with_listing(vec![product("Gwent", "gwent")]));
        storefront.fail_image("https://img/gwent.jpg");
        let cms = Arc::new(InMemoryCms::new());

        let summary = service(storefront.clone(), cms.clone(), quiet_config())
            .populate(Vec::<(String, String)>::new())
            .await
            .unwrap();

        assert_eq!(summary.created, vec!["Gwent".to_string()]);
        assert_eq!(summary.images_failed, 1);
        assert_eq!(summary.replay.attempted, 1);
        assert_eq!(summary.replay.still_failing.len(), 1);
        let cover_hits = storefront
            .image_requests()
            .iter()
            .filter(|u| *u == "https://img/gwent.jpg")
            .count();
        assert_eq!(cover_hits, 2);
        assert_eq!(cms.uploads().len(), 5);
    }

    #[tokio::test]
    async fn leftovers_are_persisted_and_replayable() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failures.ndjson");
        let storefront = Arc::new(FakeStorefront::with_listing(vec![product("Gwent", "gwent")]));
        storefront.fail_image("https://img/gwent.jpg");
        let cms = Arc::new(InMemoryCms::new());
        let cfg = PopulateConfig {
            failure_log: Some(log.clone()),
            ..quiet_config()
        };
        let svc = service(storefront.clone(), cms.clone(), cfg);

        svc.populate(Vec::<(String, String)>::new()).await.unwrap();
        assert_eq!(failures::load_ndjson(&log).await.unwrap().len(), 1);

        storefront.heal_images();
        let report = svc.replay_failure_log(&log).await.unwrap();
        assert_eq!(report.recovered, 1);
        assert!(failures::load_ndjson(&log).await.unwrap().is_empty());
        assert_eq!(cms.uploads().len(), 6);
    }

    #[tokio::test]
    async fn replay_and_populate_on_one_log_keep_every_leftover() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failures.ndjson");
        let storefront = Arc::new(FakeStorefront::with_listing(vec![product("Thronebreaker", "thronebreaker")]));
        storefront.fail_image("https://img/old.jpg");
        storefront.fail_image("https://img/thronebreaker.jpg");
        let cms = Arc::new(InMemoryCms::new().with_latency(std::time::Duration::from_millis(2)));
        let gwent = cms.seed(EntityKind::Game, "Gwent");
        failures::append_ndjson(
            &log,
            &[failures::FailureRecord::new(
                failures::GameRef::new(&gwent, "gwent"),
                "//img/old",
                crate::cms::MediaField::Cover,
                &anyhow::anyhow!("connection reset"),
            )],
        )
        .await
        .unwrap();
        let cfg = PopulateConfig {
            failure_log: Some(log.clone()),
            ..quiet_config()
        };
        let svc = service(storefront, cms, cfg);

        let (replayed, populated) = tokio::join!(
            svc.replay_failure_log(&log),
            svc.populate(Vec::<(String, String)>::new())
        );
        replayed.unwrap();
        populated.unwrap();

        let images: Vec<String> = failures::load_ndjson(&log)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.image)
            .collect();
        assert!(images.contains(&"//img/old".to_string()), "{images:?}");
        assert!(images.contains(&"//img/thronebreaker".to_string()), "{images:?}");
    }

    #[tokio::test]
    async fn listing_outage_is_an_error() {
        let storefront = Arc::new(FakeStorefront::default());
        storefront.take_listing_down();
        let err = service(storefront, Arc::new(InMemoryCms::new()), quiet_config())
            .populate(Vec::<(String, String)>::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("listing"));
    }
}
