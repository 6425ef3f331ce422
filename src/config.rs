use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;

use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_GOG_BASE_URL: &str = "https://www.gog.com";
pub const DEFAULT_CMS_URL: &str = "http://localhost:1337";
/// Hard ceiling on listing records handled per run.
pub const MAX_LISTING_RECORDS: usize = 50;
/// Hard ceiling on gallery uploads per game.
pub const MAX_GALLERY_IMAGES: usize = 5;

/// How downloaded image bodies are interpreted before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageEncoding {
    /// Bytes are uploaded exactly as received.
    #[default]
    Raw,
    /// Body is base64 text and is decoded first.
    Base64,
}

impl FromStr for ImageEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "binary" => Ok(Self::Raw),
            "base64" | "b64" => Ok(Self::Base64),
            other => Err(anyhow!("unknown image encoding {other:?} (expected raw|base64)")),
        }
    }
}

/// Knobs for one populate run. Built from env, overridable from the CLI.
#[derive(Debug, Clone)]
pub struct PopulateConfig {
    pub gog_base_url: String,
    pub cms_url: String,
    pub cms_api_token: Option<String>,
    /// Records taken from the fetched listing page; never above [`MAX_LISTING_RECORDS`].
    pub listing_limit: usize,
    /// Gallery images uploaded per game; never above [`MAX_GALLERY_IMAGES`].
    pub gallery_limit: usize,
    pub game_concurrency: usize,
    pub upload_concurrency: usize,
    /// Upload token bucket rate; 0 disables.
    pub upload_rps: u32,
    pub upload_pre_delay: Duration,
    pub upload_post_delay: Duration,
    /// Pause after each created game's media pass.
    pub game_delay: Duration,
    pub http_timeout: Duration,
    pub image_encoding: ImageEncoding,
    /// Age rating stamped on every created game.
    pub default_rating: String,
    /// NDJSON file receiving failures that survived the replay pass.
    pub failure_log: Option<PathBuf>,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            gog_base_url: DEFAULT_GOG_BASE_URL.to_string(),
            cms_url: DEFAULT_CMS_URL.to_string(),
            cms_api_token: None,
            listing_limit: MAX_LISTING_RECORDS,
            gallery_limit: MAX_GALLERY_IMAGES,
            game_concurrency: 5,
            upload_concurrency: 4,
            upload_rps: 2,
            upload_pre_delay: Duration::ZERO,
            upload_post_delay: Duration::ZERO,
            game_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(30),
            image_encoding: ImageEncoding::Raw,
            default_rating: "BR0".to_string(),
            failure_log: None,
        }
    }
}

impl PopulateConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let image_encoding = match env_opt("IMAGE_ENCODING") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring IMAGE_ENCODING; using raw");
                ImageEncoding::Raw
            }),
            None => d.image_encoding,
        };
        Self {
            gog_base_url: env_opt("GOG_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.gog_base_url),
            cms_url: env_opt("CMS_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.cms_url),
            cms_api_token: env_opt("CMS_API_TOKEN"),
            listing_limit: env_parse("LISTING_LIMIT", d.listing_limit),
            gallery_limit: env_parse("GALLERY_LIMIT", d.gallery_limit),
            game_concurrency: env_parse("GAME_CONCURRENCY", d.game_concurrency).max(1),
            upload_concurrency: env_parse("UPLOAD_CONCURRENCY", d.upload_concurrency).max(1),
            upload_rps: env_parse("UPLOAD_RPS", d.upload_rps),
            upload_pre_delay: Duration::from_millis(env_parse("UPLOAD_PRE_DELAY_MS", 0u64)),
            upload_post_delay: Duration::from_millis(env_parse("UPLOAD_POST_DELAY_MS", 0u64)),
            game_delay: Duration::from_millis(env_parse("GAME_DELAY_MS", 0u64)),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30u64).max(1)),
            image_encoding,
            default_rating: env_opt("DEFAULT_RATING").unwrap_or(d.default_rating),
            failure_log: env_opt("FAILURE_LOG").map(PathBuf::from),
        }
        .capped()
    }

    /// Pull the batch and gallery limits down to their ceilings. Config can
    /// only lower them.
    pub fn capped(mut self) -> Self {
        if self.listing_limit > MAX_LISTING_RECORDS {
            tracing::warn!(requested = self.listing_limit, max = MAX_LISTING_RECORDS, "listing limit capped");
            self.listing_limit = MAX_LISTING_RECORDS;
        }
        if self.gallery_limit > MAX_GALLERY_IMAGES {
            tracing::warn!(requested = self.gallery_limit, max = MAX_GALLERY_IMAGES, "gallery limit capped");
            self.gallery_limit = MAX_GALLERY_IMAGES;
        }
        self
    }

    /// Env keys worth echoing in a preflight snapshot.
    pub const LOGGED_KEYS: &'static [&'static str] = &[
        "GOG_BASE_URL",
        "CMS_URL",
        "CMS_API_TOKEN",
        "LISTING_LIMIT",
        "GAME_CONCURRENCY",
        "UPLOAD_CONCURRENCY",
        "UPLOAD_RPS",
        "IMAGE_ENCODING",
        "FAILURE_LOG",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_encoding_parses_aliases() {
        assert_eq!("RAW".parse::<ImageEncoding>().unwrap(), ImageEncoding::Raw);
        assert_eq!(" b64 ".parse::<ImageEncoding>().unwrap(), ImageEncoding::Base64);
        assert!("hex".parse::<ImageEncoding>().is_err());
    }

    #[test]
    fn defaults_match_batch_caps() {
        let cfg = PopulateConfig::default();
        assert_eq!(cfg.listing_limit, 50);
        assert_eq!(cfg.gallery_limit, 5);
        assert_eq!(cfg.default_rating, "BR0");
        assert!(cfg.failure_log.is_none());
    }

    #[test]
    fn limits_above_the_ceilings_are_capped() {
        let cfg = PopulateConfig {
            listing_limit: 60,
            gallery_limit: 7,
            ..PopulateConfig::default()
        }
        .capped();
        assert_eq!(cfg.listing_limit, MAX_LISTING_RECORDS);
        assert_eq!(cfg.gallery_limit, MAX_GALLERY_IMAGES);

        let lowered = PopulateConfig {
            listing_limit: 10,
            gallery_limit: 0,
            ..PopulateConfig::default()
        }
        .capped();
        assert_eq!(lowered.listing_limit, 10);
        assert_eq!(lowered.gallery_limit, 0);
    }
}
