//! Domain types for the real-time synchronization layer.

mod cache_key;
mod envelope;
mod errors;

pub use cache_key::{CacheKey, EntityKind};
pub use envelope::{
    Channel, EntityPayload, EventAction, EventEnvelope, InventoryItem, PriceQuote,
    StockAlertPayload,
};
pub use errors::SyncError;
