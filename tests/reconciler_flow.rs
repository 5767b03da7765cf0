//! Full client pipeline: WebSocket server -> transport -> apply loop ->
//! reconciler -> cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite};
use url::Url;

use stockwatch::client::{spawn_apply_loop, ReconnectPolicy, Reconciler, SyncTransport};
use stockwatch::domain::{
    CacheKey, EntityKind, EntityPayload, EventAction, EventEnvelope, InventoryItem, SyncError,
};
use stockwatch::ports::MutationBackend;

/// Backend that never expects to be called.
struct UnusedBackend;

#[async_trait]
impl MutationBackend for UnusedBackend {
    async fn create(
        &self,
        _kind: EntityKind,
        _value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError> {
        panic!("backend should not be called in this test");
    }

    async fn update(
        &self,
        _kind: EntityKind,
        _id: i64,
        _value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError> {
        panic!("backend should not be called in this test");
    }

    async fn delete(&self, _kind: EntityKind, _id: i64) -> Result<(), SyncError> {
        panic!("backend should not be called in this test");
    }
}

fn envelope(action: EventAction, id: i64, qty: i64) -> EventEnvelope {
    EventEnvelope::new(
        action,
        EntityPayload::Inventory(InventoryItem {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Item {id}"),
            stock_quantity: qty,
            available_quantity: qty,
            is_low_stock: qty <= 10,
        }),
    )
}

fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base: Duration::from_millis(50),
        cap: Duration::from_millis(500),
        max_attempts: 5,
    }
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn pushed_events_land_in_the_cache() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for (action, qty) in [
            (EventAction::Created, 10),
            (EventAction::Updated, 8),
            (EventAction::Updated, 3),
        ] {
            ws.send(tungstenite::Message::Text(envelope(action, 42, qty).to_wire()))
                .await
                .unwrap();
        }
        // Hold the socket open while the client drains.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let reconciler = Arc::new(Reconciler::new(Arc::new(UnusedBackend)));

    // Pre-populate a listing so its invalidation is observable.
    reconciler
        .with_cache(|cache| {
            cache.upsert(
                CacheKey::listing(EntityKind::Inventory, "skip=0&limit=100"),
                json!([]),
            );
        })
        .await;

    let url = Url::parse(&format!("ws://{addr}/ws/inventory")).unwrap();
    let transport = SyncTransport::new(url, policy());
    let apply_loop = spawn_apply_loop(&transport, reconciler.clone());
    transport.connect();

    let key = CacheKey::detail(EntityKind::Inventory, 42);
    wait_for(|| {
        let reconciler = reconciler.clone();
        let key = key.clone();
        async move {
            reconciler
                .with_cache(|cache| {
                    cache
                        .get(&key)
                        .map(|entry| entry.value["stock_quantity"] == 3)
                        .unwrap_or(false)
                })
                .await
        }
    })
    .await;

    reconciler
        .with_cache(|cache| {
            // The cache converged on the last event.
            let entry = cache.get(&key).unwrap();
            assert_eq!(entry.value["stock_quantity"], 3);
            assert!(!entry.is_stale);

            // And the listing was invalidated along the way.
            assert!(
                cache
                    .get(&CacheKey::listing(EntityKind::Inventory, "skip=0&limit=100"))
                    .unwrap()
                    .is_stale
            );
        })
        .await;

    transport.disconnect();
    apply_loop.abort();
    server.abort();
}

#[tokio::test]
async fn delete_event_clears_the_cached_detail() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(tungstenite::Message::Text(
            envelope(EventAction::Created, 7, 4).to_wire(),
        ))
        .await
        .unwrap();
        ws.send(tungstenite::Message::Text(
            envelope(EventAction::Deleted, 7, 0).to_wire(),
        ))
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let reconciler = Arc::new(Reconciler::new(Arc::new(UnusedBackend)));
    let url = Url::parse(&format!("ws://{addr}/ws/inventory")).unwrap();
    let transport = SyncTransport::new(url, policy());
    let apply_loop = spawn_apply_loop(&transport, reconciler.clone());
    transport.connect();

    // The create lands first, then the delete removes it. Wait until the
    // delete has been applied: the entry exists at no point afterwards.
    let key = CacheKey::detail(EntityKind::Inventory, 7);
    let mut seen_created = false;
    for _ in 0..100 {
        let present = reconciler
            .with_cache(|cache| cache.get(&key).is_some())
            .await;
        if present {
            seen_created = true;
        } else if seen_created {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let present = reconciler
        .with_cache(|cache| cache.get(&key).is_some())
        .await;
    assert!(!present, "deleted entity still cached");

    transport.disconnect();
    apply_loop.abort();
    server.abort();
}
