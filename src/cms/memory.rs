use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{CmsEntity, CmsError, CmsStore, EntityKind, MediaField, MediaUpload};
use crate::normalization::slugify;

/// Upload as seen by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub ref_id: i64,
    pub kind: EntityKind,
    pub field: MediaField,
    pub filename: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct StoredEntity {
    entity: CmsEntity,
    data: Value,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    entities: BTreeMap<EntityKind, Vec<StoredEntity>>,
    create_calls: BTreeMap<EntityKind, usize>,
    uploads: Vec<RecordedUpload>,
    failing_uploads: usize,
    rejected_names: HashSet<String>,
}

/// Process-local CMS used for dry runs and tests.
///
/// Mirrors the REST store's contract: exact-name lookup, create returns the new
/// id, uploads are attached to an existing entity. Failure injection hooks let
/// callers exercise upload and validation errors.
#[derive(Default)]
pub struct InMemoryCms {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl InMemoryCms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call so concurrent callers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Insert a record directly, bypassing create-call accounting.
    pub fn seed(&self, kind: EntityKind, name: &str) -> CmsEntity {
        let mut st = self.state();
        let data = serde_json::json!({ "name": name, "slug": slugify(name) });
        Self::insert(&mut st, kind, data)
    }

    /// Fail the next `n` uploads with a 500.
    pub fn fail_next_uploads(&self, n: usize) {
        self.state().failing_uploads = n;
    }

    /// Reject creates whose `name` matches with a 400 validation error.
    pub fn reject_creates_named(&self, name: &str) {
        self.state().rejected_names.insert(name.to_string());
    }

    pub fn entities(&self, kind: EntityKind) -> Vec<CmsEntity> {
        self.state()
            .entities
            .get(&kind)
            .map(|v| v.iter().map(|s| s.entity.clone()).collect())
            .unwrap_or_default()
    }

    /// Stored field map for an entity, as passed to `create`.
    pub fn data(&self, kind: EntityKind, id: i64) -> Option<Value> {
        self.state()
            .entities
            .get(&kind)?
            .iter()
            .find(|s| s.entity.id == id)
            .map(|s| s.data.clone())
    }

    pub fn create_calls(&self, kind: EntityKind) -> usize {
        self.state().create_calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state().uploads.clone()
    }

    fn insert(st: &mut MemoryState, kind: EntityKind, data: Value) -> CmsEntity {
        st.next_id += 1;
        let entity = CmsEntity {
            id: st.next_id,
            name: data.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            slug: data.get("slug").and_then(Value::as_str).map(str::to_string),
        };
        st.entities.entry(kind).or_default().push(StoredEntity {
            entity: entity.clone(),
            data,
        });
        entity
    }
}

#[async_trait]
impl CmsStore for InMemoryCms {
    async fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<CmsEntity>, CmsError> {
        self.pause().await;
        let st = self.state();
        Ok(st
            .entities
            .get(&kind)
            .and_then(|v| v.iter().find(|s| s.entity.name == name))
            .map(|s| s.entity.clone()))
    }

    async fn create(&self, kind: EntityKind, data: Value) -> Result<CmsEntity, CmsError> {
        self.pause().await;
        let mut st = self.state();
        *st.create_calls.entry(kind).or_default() += 1;
        let name = data.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.is_empty() || st.rejected_names.contains(name) {
            return Err(CmsError::Http {
                status: 400,
                url: format!("memory://{}", kind.plural()),
                body: format!("ValidationError: name {name:?} rejected"),
            });
        }
        Ok(Self::insert(&mut st, kind, data))
    }

    async fn upload(&self, upload: MediaUpload) -> Result<(), CmsError> {
        self.pause().await;
        let mut st = self.state();
        if st.failing_uploads > 0 {
            st.failing_uploads -= 1;
            return Err(CmsError::Http {
                status: 500,
                url: "memory://upload".into(),
                body: "injected upload failure".into(),
            });
        }
        let exists = st
            .entities
            .get(&upload.kind)
            .is_some_and(|v| v.iter().any(|s| s.entity.id == upload.ref_id));
        if !exists {
            return Err(CmsError::Http {
                status: 404,
                url: "memory://upload".into(),
                body: format!("no {} with id {}", upload.kind, upload.ref_id),
            });
        }
        st.uploads.push(RecordedUpload {
            ref_id: upload.ref_id,
            kind: upload.kind,
            field: upload.field,
            filename: upload.filename,
            size: upload.bytes.len(),
        });
        Ok(())
    }
}
