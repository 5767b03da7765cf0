//! Broker ports - interfaces for the publish/subscribe transport.
//!
//! The broker is an external infrastructure dependency (Redis in
//! production). Publishing and delivery are split into two ports so the
//! event publisher and the fan-out gateway can be wired to an in-memory
//! implementation in tests.

use async_trait::async_trait;

use crate::domain::{Channel, EventEnvelope, SyncError};

/// Port for publishing raw wire payloads to a broker topic.
///
/// Implementations must not retry: delivery from this point on is
/// at-most-once. FIFO ordering per topic is delegated to the broker.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish one serialized envelope to the topic.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Publish`] when the broker is unreachable. The
    /// caller logs and moves on; the originating mutation already committed.
    async fn publish_raw(&self, topic: &str, payload: String) -> Result<(), SyncError>;
}

/// Port for receiving parsed envelopes from the broker subscription.
///
/// The gateway's connection registry implements this; the broker
/// subscriber task feeds it one envelope at a time, in topic order.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    /// Deliver one envelope for fan-out on its channel.
    ///
    /// Must not block on any single slow consumer.
    async fn deliver(&self, channel: Channel, envelope: EventEnvelope);
}
