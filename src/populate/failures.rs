use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cms::{CmsEntity, MediaField};

/// The slice of a created game the media step needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

impl GameRef {
    pub fn new(entity: &CmsEntity, fallback_slug: &str) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            slug: entity
                .slug
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback_slug.to_string()),
        }
    }
}

/// An image upload that did not make it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub game: GameRef,
    /// Image id as it appeared in the listing.
    pub image: String,
    pub field: MediaField,
    #[serde(default)]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(game: GameRef, image: &str, field: MediaField, error: &anyhow::Error) -> Self {
        Self {
            game,
            image: image.to_string(),
            field,
            error: Some(format!("{error:#}")),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only failure list shared by every upload task of one run.
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    inner: Arc<Mutex<Vec<FailureRecord>>>,
}

impl FailureLog {
    pub async fn push(&self, record: FailureRecord) {
        self.inner.lock().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<FailureRecord> {
        self.inner.lock().await.clone()
    }

    /// Move every record out, leaving the log empty.
    pub async fn take(&self) -> Vec<FailureRecord> {
        std::mem::take(&mut *self.inner.lock().await)
    }
}

/// Append records as NDJSON, creating the file if needed.
pub async fn append_ndjson(path: &Path, records: &[FailureRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut buf = String::new();
    for r in records {
        buf.push_str(&serde_json::to_string(r)?);
        buf.push('\n');
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening failure log {}", path.display()))?;
    file.write_all(buf.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Read an NDJSON failure log. Missing file means no failures; bad lines are skipped.
pub async fn load_ndjson(path: &Path) -> Result<Vec<FailureRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FailureRecord>(line) {
            Ok(r) => out.push(r),
            Err(e) => warn!(path = %path.display(), line = idx + 1, error = %e, "skipping malformed failure record"),
        }
    }
    Ok(out)
}

/// Replace the log's contents; an empty slice truncates it.
///
/// Written to a sibling temp file and renamed over the log, so readers see
/// either the old or the new contents.
pub async fn rewrite_ndjson(path: &Path, records: &[FailureRecord]) -> Result<()> {
    let mut buf = String::new();
    for r in records {
        buf.push_str(&serde_json::to_string(r)?);
        buf.push('\n');
    }
    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, buf)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing failure log {}", path.display()))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("failures"));
    name.push(".tmp");
    path.with_file_name(name)
}
