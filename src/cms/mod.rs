//! CMS collaborator surface: entity lookup/creation for games and taxonomy
//! records, plus the media upload endpoint.

pub mod memory;
pub mod strapi;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::InMemoryCms;
pub use strapi::StrapiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Game,
    Developer,
    Publisher,
    Category,
    Platform,
}

impl EntityKind {
    pub fn singular(self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::Developer => "developer",
            Self::Publisher => "publisher",
            Self::Category => "category",
            Self::Platform => "platform",
        }
    }

    /// REST collection segment (`/api/{plural}`).
    pub fn plural(self) -> &'static str {
        match self {
            Self::Game => "games",
            Self::Developer => "developers",
            Self::Publisher => "publishers",
            Self::Category => "categories",
            Self::Platform => "platforms",
        }
    }

    /// Content-type uid, e.g. `api::game.game`; used as the upload `ref`.
    pub fn uid(self) -> String {
        let s = self.singular();
        format!("api::{s}.{s}")
    }

    pub fn is_taxonomy(self) -> bool {
        !matches!(self, Self::Game)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

/// Persisted record as the pipeline needs it: identity plus display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmsEntity {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaField {
    Cover,
    Gallery,
}

impl MediaField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Gallery => "gallery",
        }
    }
}

impl fmt::Display for MediaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file bound to an entity attribute.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub ref_id: i64,
    pub kind: EntityKind,
    pub field: MediaField,
    pub filename: String,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum CmsError {
    #[error("cms http {status} on {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },
    #[error("cms transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("cms payload: {0}")]
    Payload(String),
}

impl CmsError {
    /// True when the CMS answered and refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }
}

#[async_trait]
pub trait CmsStore: Send + Sync {
    /// First entity of `kind` whose name matches exactly.
    async fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<CmsEntity>, CmsError>;

    /// Create an entity from a field map; returns the stored record.
    async fn create(&self, kind: EntityKind, data: Value) -> Result<CmsEntity, CmsError>;

    /// Upload a file and attach it to `upload.field` of the referenced entity.
    async fn upload(&self, upload: MediaUpload) -> Result<(), CmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_rest_and_uid_names() {
        assert_eq!(EntityKind::Game.uid(), "api::game.game");
        assert_eq!(EntityKind::Category.plural(), "categories");
        assert_eq!(EntityKind::Platform.to_string(), "platform");
        assert!(!EntityKind::Game.is_taxonomy());
        assert!(EntityKind::Publisher.is_taxonomy());
    }

    #[test]
    fn only_client_errors_count_as_rejections() {
        let rejected = CmsError::Http {
            status: 400,
            url: "/api/games".into(),
            body: "ValidationError".into(),
        };
        let broken = CmsError::Http {
            status: 502,
            url: "/api/upload".into(),
            body: String::new(),
        };
        assert!(rejected.is_rejection());
        assert!(!broken.is_rejection());
        assert!(!CmsError::Payload("x".into()).is_rejection());
    }
}
