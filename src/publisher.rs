//! Event publisher - bridges committed domain mutations to the broker.
//!
//! Called by the REST/persistence layer after a durable commit. Delivery is
//! fire-and-forget and at-most-once from this point on: a publish failure is
//! logged, never retried, because the mutation itself already succeeded.
//! Clients that need guaranteed correctness must also refetch via REST;
//! correctness never depends on push delivery alone.

use std::sync::Arc;

use crate::domain::{
    EntityPayload, EventAction, EventEnvelope, InventoryItem, PriceQuote, StockAlertPayload,
};
use crate::ports::BrokerPublisher;

/// Converts mutation results into channel-scoped envelopes and hands them
/// to the broker.
pub struct EventPublisher {
    broker: Arc<dyn BrokerPublisher>,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerPublisher>) -> Self {
        Self { broker }
    }

    /// Publish an inventory mutation on the `inventory` channel.
    pub async fn inventory_changed(&self, action: EventAction, item: InventoryItem) {
        self.publish(EventEnvelope::new(action, EntityPayload::Inventory(item)))
            .await;
    }

    /// Publish a price mutation on the `price` channel.
    pub async fn price_changed(&self, action: EventAction, quote: PriceQuote) {
        self.publish(EventEnvelope::new(action, EntityPayload::Price(quote)))
            .await;
    }

    /// Publish a low-stock alert on the `alerts` channel.
    ///
    /// Emitted when an inventory mutation drops available stock below its
    /// minimum level.
    pub async fn stock_alert(&self, alert: StockAlertPayload) {
        self.publish(EventEnvelope::new(
            EventAction::Updated,
            EntityPayload::Alert(alert),
        ))
        .await;
    }

    /// Publish an already-built envelope, best effort.
    pub async fn publish(&self, envelope: EventEnvelope) {
        let channel = envelope.channel();
        let payload = envelope.to_wire();

        match self.broker.publish_raw(channel.topic(), payload).await {
            Ok(()) => {
                tracing::debug!(channel = %channel, action = ?envelope.action, "published event");
            }
            Err(e) => {
                // At-most-once: the mutation already committed durably, so
                // a lost push only delays clients until their next refetch.
                tracing::warn!(channel = %channel, error = %e, "event publish failed, dropping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SyncError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBroker {
        published: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingBroker {
        fn new(fail: bool) -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl BrokerPublisher for RecordingBroker {
        async fn publish_raw(&self, topic: &str, payload: String) -> Result<(), SyncError> {
            if self.fail {
                return Err(SyncError::Publish("broker unreachable".to_string()));
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    fn item(id: i64, qty: i64) -> InventoryItem {
        InventoryItem {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Item {id}"),
            stock_quantity: qty,
            available_quantity: qty,
            is_low_stock: false,
        }
    }

    #[tokio::test]
    async fn inventory_change_publishes_on_inventory_topic() {
        let broker = Arc::new(RecordingBroker::new(false));
        let publisher = EventPublisher::new(broker.clone());

        publisher
            .inventory_changed(EventAction::Updated, item(42, 7))
            .await;

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "inventory:updates");
        assert!(published[0].1.contains(r#""type":"inventory_update""#));
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let broker = Arc::new(RecordingBroker::new(true));
        let publisher = EventPublisher::new(broker.clone());

        // Must not panic or propagate; at-most-once loss is accepted.
        publisher
            .inventory_changed(EventAction::Created, item(1, 10))
            .await;

        assert!(broker.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stock_alert_goes_to_alerts_topic() {
        let broker = Arc::new(RecordingBroker::new(false));
        let publisher = EventPublisher::new(broker.clone());

        publisher
            .stock_alert(StockAlertPayload {
                item_id: 7,
                sku: "SKU-7".to_string(),
                name: "Item 7".to_string(),
                current_stock: 2,
                min_stock_level: 5,
                alert_level: "warning".to_string(),
                message: None,
            })
            .await;

        let published = broker.published.lock().unwrap();
        assert_eq!(published[0].0, "stock:alerts");
        assert!(published[0].1.contains(r#""type":"stock_alert""#));
    }
}
