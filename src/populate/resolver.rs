use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use futures::future::try_join_all;
use serde_json::json;
use tracing::{debug, info};

use super::keyed_lock::KeyedLocks;
use crate::cms::{CmsEntity, CmsStore, EntityKind};
use crate::normalization::slugify;

type Key = (EntityKind, String);

/// Look-up-or-create for developer/publisher/category/platform records.
///
/// Names are matched exactly. Within one run a (kind, name) pair is resolved
/// under its own lock, so concurrent games sharing a genre create it once.
pub struct RelationResolver {
    cms: Arc<dyn CmsStore>,
    locks: KeyedLocks<Key>,
    resolved: Mutex<HashMap<Key, CmsEntity>>,
    created: AtomicUsize,
}

impl RelationResolver {
    pub fn new(cms: Arc<dyn CmsStore>) -> Self {
        Self {
            cms,
            locks: KeyedLocks::default(),
            resolved: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Taxonomy records created by this resolver so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn cached(&self, key: &Key) -> Option<CmsEntity> {
        self.resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn remember(&self, key: Key, entity: CmsEntity) {
        self.resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, entity);
    }

    pub async fn resolve(&self, name: &str, kind: EntityKind) -> Result<CmsEntity> {
        if !kind.is_taxonomy() {
            bail!("relation resolver does not handle {kind} records");
        }
        let key = (kind, name.to_string());
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let _guard = self.locks.lock(&key).await;
        // Another task may have finished while we waited.
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let entity = match self
            .cms
            .find_by_name(kind, name)
            .await
            .with_context(|| format!("looking up {kind} {name:?}"))?
        {
            Some(existing) => {
                debug!(%kind, name, id = existing.id, "relation found");
                existing
            }
            None => {
                let created = self
                    .cms
                    .create(kind, json!({ "name": name, "slug": slugify(name) }))
                    .await
                    .with_context(|| format!("creating {kind} {name:?}"))?;
                self.created.fetch_add(1, Ordering::Relaxed);
                info!(%kind, name, id = created.id, "relation created");
                created
            }
        };
        self.remember(key, entity.clone());
        Ok(entity)
    }

    /// Resolve every name concurrently, preserving input order.
    pub async fn resolve_all(&self, names: &[String], kind: EntityKind) -> Result<Vec<CmsEntity>> {
        try_join_all(names.iter().map(|n| self.resolve(n, kind))).await
    }

    pub async fn resolve_opt(&self, name: Option<&str>, kind: EntityKind) -> Result<Option<CmsEntity>> {
        match name {
            Some(n) => self.resolve(n, kind).await.map(Some),
            None => Ok(None),
        }
    }
}
