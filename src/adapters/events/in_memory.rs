//! In-memory broker implementation for testing.
//!
//! Provides synchronous, deterministic pub/sub delivery for unit and
//! integration tests, replacing Redis. Delivery path matches production:
//! payloads are serialized to the wire format on publish and parsed back
//! before reaching the sinks, so protocol bugs surface in tests too.
//!
//! # Panics
//!
//! Methods may panic if internal locks are poisoned. This is acceptable
//! for test code but this adapter should NOT be used in production.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::domain::{Channel, EventEnvelope, SyncError};
use crate::ports::{BrokerPublisher, EnvelopeSink};

/// In-memory broker for testing.
///
/// Features:
/// - Synchronous delivery (deterministic for tests)
/// - Published-message capture for assertions
/// - Sink registration, mirroring the production subscriber wiring
pub struct InMemoryBroker {
    sinks: RwLock<Vec<Arc<dyn EnvelopeSink>>>,
    published: RwLock<Vec<(String, String)>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            published: RwLock::new(Vec::new()),
        }
    }

    /// Register a sink to receive every parsed envelope, as the Redis
    /// subscriber task does in production.
    pub fn attach_sink(&self, sink: Arc<dyn EnvelopeSink>) {
        self.sinks
            .write()
            .expect("InMemoryBroker: sinks lock poisoned")
            .push(sink);
    }

    // === Test Helpers ===

    /// All published (topic, payload) pairs, in publish order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .read()
            .expect("InMemoryBroker: published lock poisoned")
            .clone()
    }

    /// Payloads published to one topic, in publish order.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p)
            .collect()
    }

    /// Count of published messages across all topics.
    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .expect("InMemoryBroker: published lock poisoned")
            .len()
    }

    /// Clears captured messages (for test isolation).
    pub fn clear(&self) {
        self.published
            .write()
            .expect("InMemoryBroker: published lock poisoned")
            .clear();
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerPublisher for InMemoryBroker {
    async fn publish_raw(&self, topic: &str, payload: String) -> Result<(), SyncError> {
        self.published
            .write()
            .expect("InMemoryBroker: published lock poisoned")
            .push((topic.to_string(), payload.clone()));

        let Some(channel) = Channel::from_topic(topic) else {
            // Unknown topics are stored for assertions but not delivered,
            // matching a subscriber that never subscribed to them.
            return Ok(());
        };

        let envelope = EventEnvelope::from_wire(&payload)?;

        // Clone sinks to release the lock before await points.
        let sinks: Vec<Arc<dyn EnvelopeSink>> = self
            .sinks
            .read()
            .expect("InMemoryBroker: sinks lock poisoned")
            .clone();

        for sink in sinks {
            sink.deliver(channel, envelope.clone()).await;
        }

        Ok(())
    }
}
