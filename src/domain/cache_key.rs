//! Canonical cache keys.
//!
//! Keys are structured values rather than ad hoc string literals so that
//! equality and invalidation-by-prefix are well defined. A detail key names
//! one entity; a listing key names a filtered/aggregated view whose contents
//! an envelope cannot patch in place (the filter and pagination live only on
//! the query side), so listings are invalidated wholesale.

use serde::{Deserialize, Serialize};

/// Entity families the cache partitions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Inventory,
    Price,
    Alert,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Inventory => "inventory",
            EntityKind::Price => "price",
            EntityKind::Alert => "alert",
        }
    }
}

/// A canonical, hashable cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    /// A single entity, e.g. inventory item 42.
    Detail { kind: EntityKind, id: i64 },

    /// A list/aggregate view. `filter` is a stable serialization of the
    /// query parameters, e.g. `"skip=0&limit=100"` or `"threshold=10"`.
    Listing { kind: EntityKind, filter: String },
}

impl CacheKey {
    /// Key for a single entity.
    pub fn detail(kind: EntityKind, id: i64) -> Self {
        CacheKey::Detail { kind, id }
    }

    /// Key for a filtered list or aggregate view.
    pub fn listing(kind: EntityKind, filter: impl Into<String>) -> Self {
        CacheKey::Listing {
            kind,
            filter: filter.into(),
        }
    }

    /// The entity kind prefix of this key.
    pub fn kind(&self) -> EntityKind {
        match self {
            CacheKey::Detail { kind, .. } => *kind,
            CacheKey::Listing { kind, .. } => *kind,
        }
    }

    /// Whether this is a listing/aggregate key of the given kind.
    pub fn is_listing_of(&self, kind: EntityKind) -> bool {
        matches!(self, CacheKey::Listing { kind: k, .. } if *k == kind)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Detail { kind, id } => write!(f, "{}:item:{}", kind.as_str(), id),
            CacheKey::Listing { kind, filter } => write!(f, "{}:list:{}", kind.as_str(), filter),
        }
    }
}
