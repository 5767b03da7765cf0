//! Cache reconciler - keeps the client cache consistent with pushed
//! events and optimistic local mutations.
//!
//! The reconciler is the single writer of the cache store. Incoming
//! envelopes are applied one at a time under the store lock, in arrival
//! order, so the cache always reflects some prefix of the event stream.
//!
//! Local mutations are optimistic: the cache is patched speculatively,
//! the REST backend is called, and on failure the exact pre-mutation
//! snapshot is restored.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{CacheKey, EntityKind, EventEnvelope, SyncError};
use crate::ports::MutationBackend;

use super::cache::CacheStore;
use super::router;

/// Applies envelopes and optimistic mutations to the cache store.
pub struct Reconciler {
    cache: Mutex<CacheStore>,
    backend: Arc<dyn MutationBackend>,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn MutationBackend>) -> Self {
        Self {
            cache: Mutex::new(CacheStore::new()),
            backend,
        }
    }

    /// Run a closure against the store, for reads and test setup.
    pub async fn with_cache<R>(&self, f: impl FnOnce(&mut CacheStore) -> R) -> R {
        let mut cache = self.cache.lock().await;
        f(&mut cache)
    }

    /// Apply one pushed envelope to the cache.
    ///
    /// Created and updated events upsert the detail entry with the pushed
    /// snapshot; deleted events remove it. Either way the affected listing
    /// families are marked stale, since listings cannot be patched in
    /// place.
    pub async fn apply_event(&self, envelope: &EventEnvelope) {
        let mut cache = self.cache.lock().await;
        apply(&mut cache, envelope);
    }

    /// Create an entity through the REST backend.
    ///
    /// No speculative cache write: the entity has no identifier until the
    /// server assigns one. On success the canonical entity is cached and
    /// the affected listings are marked stale.
    pub async fn create(
        &self,
        kind: EntityKind,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError> {
        let canonical = self.backend.create(kind, value).await?;

        let mut cache = self.cache.lock().await;
        if let Some(id) = canonical.get("id").and_then(|v| v.as_i64()) {
            cache.upsert(CacheKey::detail(kind, id), canonical.clone());
        }
        mark_routes_stale(&mut cache, kind);
        Ok(canonical)
    }

    /// Update an entity optimistically.
    ///
    /// The patch is shallow-merged into the cached detail before the
    /// backend call so the UI reflects the change immediately. On success
    /// the canonical entity replaces the speculative one; on failure the
    /// pre-mutation snapshot is restored exactly.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError> {
        let key = CacheKey::detail(kind, id);

        let snapshot = {
            let mut cache = self.cache.lock().await;
            let snapshot = cache.snapshot(&key);
            let speculative = match snapshot.as_ref() {
                Some(entry) => shallow_merge(entry.value.clone(), &patch),
                None => patch.clone(),
            };
            cache.upsert(key.clone(), speculative);
            snapshot
        };

        match self.backend.update(kind, id, patch).await {
            Ok(canonical) => {
                let mut cache = self.cache.lock().await;
                cache.upsert(key, canonical.clone());
                mark_routes_stale(&mut cache, kind);
                Ok(canonical)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "update rejected, rolling back");
                let mut cache = self.cache.lock().await;
                cache.restore(key, snapshot);
                Err(e)
            }
        }
    }

    /// Delete an entity optimistically.
    ///
    /// The detail entry is removed before the backend call and restored
    /// if the backend rejects the delete.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), SyncError> {
        let key = CacheKey::detail(kind, id);

        let snapshot = {
            let mut cache = self.cache.lock().await;
            let snapshot = cache.snapshot(&key);
            cache.remove(&key);
            snapshot
        };

        match self.backend.delete(kind, id).await {
            Ok(()) => {
                let mut cache = self.cache.lock().await;
                mark_routes_stale(&mut cache, kind);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "delete rejected, rolling back");
                let mut cache = self.cache.lock().await;
                cache.restore(key, snapshot);
                Err(e)
            }
        }
    }
}

/// Apply one envelope to the store. Synchronous so ordering properties
/// can be tested without a runtime.
pub(crate) fn apply(cache: &mut CacheStore, envelope: &EventEnvelope) {
    let outcome = router::route(envelope);

    if outcome.remove_detail {
        cache.remove(&outcome.detail);
    } else {
        cache.upsert(outcome.detail.clone(), envelope.payload.to_value());
    }

    for kind in outcome.stale_listings {
        cache.mark_listings_stale(*kind);
    }

    tracing::debug!(
        key = %outcome.detail,
        action = ?envelope.action,
        "applied event to cache"
    );
}

/// Mark the listing families a mutation of `kind` invalidates.
fn mark_routes_stale(cache: &mut CacheStore, kind: EntityKind) {
    for stale_kind in router::stale_listings_for(kind) {
        cache.mark_listings_stale(*stale_kind);
    }
}

/// Overlay `patch` onto `base` one level deep.
///
/// Only object-onto-object merges keep untouched fields; anything else
/// replaces the value wholesale.
fn shallow_merge(base: serde_json::Value, patch: &serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                base_map.insert(k.clone(), v.clone());
            }
            serde_json::Value::Object(base_map)
        }
        (_, patch) => patch.clone(),
    }
}
