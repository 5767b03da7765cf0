//! Client-side cache store.
//!
//! A flat map from [`CacheKey`] to JSON values with freshness metadata.
//! The store itself is not thread safe; the reconciler wraps it in an
//! async mutex and is the only writer, which is what keeps event
//! application atomic per envelope.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{CacheKey, EntityKind};

/// One cached value with freshness metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    /// When the value was last confirmed fresh. Monotonic per entry: an
    /// upsert never moves it backwards, even if the wall clock does.
    pub fetched_at: DateTime<Utc>,
    /// Stale entries are still served (stale-while-revalidate) but the
    /// view owning them should refetch.
    pub is_stale: bool,
}

impl CacheEntry {
    fn fresh(value: serde_json::Value) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            is_stale: false,
        }
    }
}

/// In-memory cache keyed by [`CacheKey`].
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Snapshot an entry for later rollback.
    pub fn snapshot(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    /// Insert or replace an entry with a fresh value.
    pub fn upsert(&mut self, key: CacheKey, value: serde_json::Value) {
        let mut entry = CacheEntry::fresh(value);
        if let Some(existing) = self.entries.get(&key) {
            // Keep fetched_at monotonic under clock adjustments.
            if existing.fetched_at > entry.fetched_at {
                entry.fetched_at = existing.fetched_at;
            }
        }
        self.entries.insert(key, entry);
    }

    /// Restore an entry to a previous snapshot, or remove it if the
    /// snapshot is `None` (the entry did not exist before).
    pub fn restore(&mut self, key: CacheKey, snapshot: Option<CacheEntry>) {
        match snapshot {
            Some(entry) => {
                self.entries.insert(key, entry);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Mark one entry stale. No-op when absent.
    pub fn mark_stale(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.is_stale = true;
        }
    }

    /// Mark every listing of the given kind stale.
    ///
    /// Listings cannot be patched in place: their filter and pagination
    /// live on the query side, so any mutation of the underlying kind
    /// invalidates them wholesale.
    pub fn mark_listings_stale(&mut self, kind: EntityKind) -> usize {
        let mut marked = 0;
        for (key, entry) in self.entries.iter_mut() {
            if key.is_listing_of(kind) && !entry.is_stale {
                entry.is_stale = true;
                marked += 1;
            }
        }
        marked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_and_get() {
        let mut store = CacheStore::new();
        let key = CacheKey::detail(EntityKind::Inventory, 42);

        store.upsert(key.clone(), json!({"id": 42, "stock_quantity": 7}));

        let entry = store.get(&key).unwrap();
        assert_eq!(entry.value["stock_quantity"], 7);
        assert!(!entry.is_stale);
    }

    #[test]
    fn upsert_clears_staleness() {
        let mut store = CacheStore::new();
        let key = CacheKey::detail(EntityKind::Inventory, 42);

        store.upsert(key.clone(), json!({"id": 42}));
        store.mark_stale(&key);
        assert!(store.get(&key).unwrap().is_stale);

        store.upsert(key.clone(), json!({"id": 42, "stock_quantity": 3}));
        assert!(!store.get(&key).unwrap().is_stale);
    }

    #[test]
    fn fetched_at_never_moves_backwards() {
        let mut store = CacheStore::new();
        let key = CacheKey::detail(EntityKind::Inventory, 1);

        store.upsert(key.clone(), json!({"v": 1}));
        // Simulate a clock that jumped backwards between upserts.
        let future = Utc::now() + chrono::Duration::hours(1);
        if let Some(entry) = store.entries.get_mut(&key) {
            entry.fetched_at = future;
        }

        store.upsert(key.clone(), json!({"v": 2}));
        let entry = store.get(&key).unwrap();
        assert_eq!(entry.value["v"], 2);
        assert_eq!(entry.fetched_at, future);
    }

    #[test]
    fn mark_listings_stale_is_kind_scoped() {
        let mut store = CacheStore::new();
        store.upsert(
            CacheKey::listing(EntityKind::Inventory, "skip=0&limit=100"),
            json!([]),
        );
        store.upsert(
            CacheKey::listing(EntityKind::Inventory, "skip=100&limit=100"),
            json!([]),
        );
        store.upsert(CacheKey::listing(EntityKind::Price, "limit=50"), json!([]));
        store.upsert(CacheKey::detail(EntityKind::Inventory, 1), json!({}));

        let marked = store.mark_listings_stale(EntityKind::Inventory);
        assert_eq!(marked, 2);

        // Price listings and inventory details are untouched.
        assert!(
            !store
                .get(&CacheKey::listing(EntityKind::Price, "limit=50"))
                .unwrap()
                .is_stale
        );
        assert!(
            !store
                .get(&CacheKey::detail(EntityKind::Inventory, 1))
                .unwrap()
                .is_stale
        );
    }

    #[test]
    fn restore_reinstates_snapshot() {
        let mut store = CacheStore::new();
        let key = CacheKey::detail(EntityKind::Price, 42);

        store.upsert(key.clone(), json!({"final_price": 10.0}));
        let snapshot = store.snapshot(&key);

        store.upsert(key.clone(), json!({"final_price": 8.0}));
        store.restore(key.clone(), snapshot);

        assert_eq!(store.get(&key).unwrap().value["final_price"], 10.0);
    }

    #[test]
    fn restore_none_removes_entry() {
        let mut store = CacheStore::new();
        let key = CacheKey::detail(EntityKind::Price, 42);

        store.upsert(key.clone(), json!({"final_price": 10.0}));
        store.restore(key.clone(), None);

        assert!(store.get(&key).is_none());
        assert!(store.is_empty());
    }
}
