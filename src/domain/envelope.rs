//! Event envelopes and the wire protocol shared by publisher, gateway,
//! and client.
//!
//! Channels are static and known at startup; there is no dynamic topic
//! creation. An envelope is immutable once published and is never persisted
//! by this layer (the durable record lives in the persistence layer).
//!
//! # Wire format
//!
//! ```json
//! {"type": "inventory_update",
//!  "data": {"action": "updated", "item": {"id": 42, "...": "..."}},
//!  "timestamp": "2026-08-30T12:00:00Z"}
//! ```
//!
//! The `type` discriminant is `inventory_update`, `price_update`, or
//! `stock_alert`; these field names are the cross-network contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cache_key::EntityKind;
use super::errors::SyncError;

// ============================================
// Channels
// ============================================

/// Named logical topic partitioning events by domain area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Inventory,
    Price,
    Alerts,
}

impl Channel {
    /// All channels, in a stable order. Used to size registries and to
    /// subscribe the gateway to every broker topic at startup.
    pub const ALL: [Channel; 3] = [Channel::Inventory, Channel::Price, Channel::Alerts];

    /// Short channel name, used in socket endpoint paths (`/ws/inventory`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Inventory => "inventory",
            Channel::Price => "price",
            Channel::Alerts => "alerts",
        }
    }

    /// Broker topic this channel maps to.
    pub fn topic(&self) -> &'static str {
        match self {
            Channel::Inventory => "inventory:updates",
            Channel::Price => "price:updates",
            Channel::Alerts => "stock:alerts",
        }
    }

    /// Reverse lookup from a broker topic name.
    pub fn from_topic(topic: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.topic() == topic)
    }

    /// Reverse lookup from an endpoint path segment.
    pub fn from_path_segment(segment: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.as_str() == segment)
    }

    /// Entity kind whose cache entries this channel's events affect.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Channel::Inventory => EntityKind::Inventory,
            Channel::Price => EntityKind::Price,
            Channel::Alerts => EntityKind::Alert,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Actions and payloads
// ============================================

/// Mutation action carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

/// Inventory item snapshot as pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i64,
    pub available_quantity: i64,
    #[serde(default)]
    pub is_low_stock: bool,
}

/// Active price snapshot as pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub id: i64,
    pub inventory_id: i64,
    pub selling_price: f64,
    #[serde(default)]
    pub discount_price: Option<f64>,
    pub final_price: f64,
    #[serde(default)]
    pub effective_from: Option<DateTime<Utc>>,
}

/// Low-stock alert payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAlertPayload {
    pub item_id: i64,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock_level: i64,
    pub alert_level: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Strongly typed entity payload, one case per channel.
///
/// The router matches this exhaustively; adding a channel forces every
/// routing table to handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    Inventory(InventoryItem),
    Price(PriceQuote),
    Alert(StockAlertPayload),
}

impl EntityPayload {
    /// Identifier of the entity this payload describes.
    pub fn entity_id(&self) -> i64 {
        match self {
            EntityPayload::Inventory(item) => item.id,
            EntityPayload::Price(quote) => quote.inventory_id,
            EntityPayload::Alert(alert) => alert.item_id,
        }
    }

    /// The payload as a JSON value, as cached client-side.
    pub fn to_value(&self) -> serde_json::Value {
        let result = match self {
            EntityPayload::Inventory(item) => serde_json::to_value(item),
            EntityPayload::Price(quote) => serde_json::to_value(quote),
            EntityPayload::Alert(alert) => serde_json::to_value(alert),
        };
        // Payload structs contain only serializable fields.
        result.unwrap_or_default()
    }
}

// ============================================
// Envelope
// ============================================

/// The immutable message unit carrying one entity mutation event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub action: EventAction,
    pub payload: EntityPayload,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time.
    pub fn new(action: EventAction, payload: EntityPayload) -> Self {
        Self {
            action,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// The channel this envelope belongs to, derived from its payload.
    pub fn channel(&self) -> Channel {
        match self.payload {
            EntityPayload::Inventory(_) => Channel::Inventory,
            EntityPayload::Price(_) => Channel::Price,
            EntityPayload::Alert(_) => Channel::Alerts,
        }
    }

    /// Identifier of the affected entity.
    pub fn entity_id(&self) -> i64 {
        self.payload.entity_id()
    }

    /// Serialize to the documented wire JSON.
    pub fn to_wire(&self) -> String {
        let wire: WireEnvelope = self.clone().into();
        // The wire enum contains only serializable fields; this cannot fail.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Parse an envelope from wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Protocol`] for any malformed message. Callers
    /// log and discard; a bad frame never terminates a connection.
    pub fn from_wire(text: &str) -> Result<Self, SyncError> {
        let wire: WireEnvelope =
            serde_json::from_str(text).map_err(|e| SyncError::Protocol(e.to_string()))?;
        Ok(wire.into())
    }
}

// ============================================
// Wire representation
// ============================================

#[derive(Debug, Serialize, Deserialize)]
struct WireData<T> {
    action: EventAction,
    item: T,
}

/// Serde-level mirror of [`EventEnvelope`] carrying the documented
/// `type`/`data`/`timestamp` field names.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireEnvelope {
    #[serde(rename = "inventory_update")]
    Inventory {
        data: WireData<InventoryItem>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "price_update")]
    Price {
        data: WireData<PriceQuote>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "stock_alert")]
    Alert {
        data: WireData<StockAlertPayload>,
        timestamp: DateTime<Utc>,
    },
}

impl From<EventEnvelope> for WireEnvelope {
    fn from(envelope: EventEnvelope) -> Self {
        let timestamp = envelope.timestamp;
        match envelope.payload {
            EntityPayload::Inventory(item) => WireEnvelope::Inventory {
                data: WireData {
                    action: envelope.action,
                    item,
                },
                timestamp,
            },
            EntityPayload::Price(item) => WireEnvelope::Price {
                data: WireData {
                    action: envelope.action,
                    item,
                },
                timestamp,
            },
            EntityPayload::Alert(item) => WireEnvelope::Alert {
                data: WireData {
                    action: envelope.action,
                    item,
                },
                timestamp,
            },
        }
    }
}

impl From<WireEnvelope> for EventEnvelope {
    fn from(wire: WireEnvelope) -> Self {
        match wire {
            WireEnvelope::Inventory { data, timestamp } => EventEnvelope {
                action: data.action,
                payload: EntityPayload::Inventory(data.item),
                timestamp,
            },
            WireEnvelope::Price { data, timestamp } => EventEnvelope {
                action: data.action,
                payload: EntityPayload::Price(data.item),
                timestamp,
            },
            WireEnvelope::Alert { data, timestamp } => EventEnvelope {
                action: data.action,
                payload: EntityPayload::Alert(data.item),
                timestamp,
            },
        }
    }
}
