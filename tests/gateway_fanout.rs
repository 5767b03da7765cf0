//! End-to-end fan-out: publisher -> broker -> registry -> WebSocket
//! clients, using the in-memory broker in place of Redis.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite};

use stockwatch::adapters::events::InMemoryBroker;
use stockwatch::config::RealtimeConfig;
use stockwatch::domain::{EventAction, InventoryItem, PriceQuote};
use stockwatch::gateway::{ws_router, ConnectionRegistry, GatewayState};
use stockwatch::publisher::EventPublisher;

struct Harness {
    addr: std::net::SocketAddr,
    registry: Arc<ConnectionRegistry>,
    publisher: EventPublisher,
}

/// Serve the gateway on an ephemeral port with the in-memory broker
/// wired the way Redis is in production.
async fn start_gateway(realtime: RealtimeConfig) -> Harness {
    let registry = Arc::new(ConnectionRegistry::new(realtime.queue_capacity));

    let broker = Arc::new(InMemoryBroker::new());
    broker.attach_sink(registry.clone());
    let publisher = EventPublisher::new(broker);

    let app = ws_router(GatewayState::new(registry.clone(), realtime));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        addr,
        registry,
        publisher,
    }
}

type ClientSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(addr: std::net::SocketAddr, channel: &str) -> ClientSocket {
    let (ws, _) = connect_async(format!("ws://{addr}/ws/{channel}"))
        .await
        .unwrap();
    ws
}

async fn next_text<S>(ws: &mut S) -> String
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        if let tungstenite::Message::Text(text) = frame {
            return text;
        }
    }
}

fn item(id: i64, qty: i64) -> InventoryItem {
    InventoryItem {
        id,
        sku: format!("SKU-{id}"),
        name: format!("Item {id}"),
        stock_quantity: qty,
        available_quantity: qty,
        is_low_stock: qty <= 10,
    }
}

async fn wait_for_connections(registry: &ConnectionRegistry, expected: usize) {
    for _ in 0..300 {
        if registry.stats().await.total_connections == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    panic!("never reached {expected} connections");
}

#[tokio::test]
async fn published_event_reaches_all_channel_subscribers() {
    let harness = start_gateway(RealtimeConfig::default()).await;

    let mut first = connect(harness.addr, "inventory").await;
    let mut second = connect(harness.addr, "inventory").await;
    wait_for_connections(&harness.registry, 2).await;

    harness
        .publisher
        .inventory_changed(EventAction::Updated, item(42, 7))
        .await;

    for ws in [&mut first, &mut second] {
        let text = next_text(ws).await;
        assert!(text.contains(r#""type":"inventory_update""#));
        assert!(text.contains(r#""action":"updated""#));
        assert!(text.contains(r#""id":42"#));
    }
}

#[tokio::test]
async fn events_are_scoped_to_their_channel() {
    let harness = start_gateway(RealtimeConfig::default()).await;

    let mut inventory_ws = connect(harness.addr, "inventory").await;
    let mut price_ws = connect(harness.addr, "price").await;
    wait_for_connections(&harness.registry, 2).await;

    harness
        .publisher
        .price_changed(
            EventAction::Updated,
            PriceQuote {
                id: 5,
                inventory_id: 42,
                selling_price: 19.99,
                discount_price: Some(17.99),
                final_price: 17.99,
                effective_from: None,
            },
        )
        .await;

    let text = next_text(&mut price_ws).await;
    assert!(text.contains(r#""type":"price_update""#));

    // The inventory subscriber must see nothing from the price channel.
    let nothing = tokio::time::timeout(Duration::from_millis(300), inventory_ws.next()).await;
    assert!(nothing.is_err(), "inventory client received a price event");
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let harness = start_gateway(RealtimeConfig::default()).await;

    let mut ws = connect(harness.addr, "inventory").await;
    wait_for_connections(&harness.registry, 1).await;

    for qty in [1, 2, 3, 4, 5] {
        harness
            .publisher
            .inventory_changed(EventAction::Updated, item(1, qty))
            .await;
    }

    for expected in [1, 2, 3, 4, 5] {
        let text = next_text(&mut ws).await;
        assert!(
            text.contains(&format!(r#""stock_quantity":{expected}"#)),
            "expected quantity {expected} in frame: {text}"
        );
    }
}

#[tokio::test]
async fn unknown_channel_is_rejected() {
    let harness = start_gateway(RealtimeConfig::default()).await;

    let result = connect_async(format!("ws://{}/ws/futures", harness.addr)).await;
    assert!(result.is_err(), "connected to a channel that does not exist");
    assert_eq!(harness.registry.stats().await.total_connections, 0);
}

#[tokio::test]
async fn unresponsive_client_is_evicted_by_heartbeat() {
    let realtime = RealtimeConfig {
        heartbeat_interval_secs: 1,
        missed_pong_limit: 1,
        ..RealtimeConfig::default()
    };
    let harness = start_gateway(realtime).await;

    // tungstenite only answers pings when the stream is polled, so a
    // client that completes the handshake and then never reads behaves
    // like a hung dashboard tab: the socket stays open but no pongs
    // come back.
    let ws = connect(harness.addr, "inventory").await;
    wait_for_connections(&harness.registry, 1).await;

    // One missed ping is enough at limit 1; the writer closes the
    // connection on the next heartbeat tick.
    wait_for_connections(&harness.registry, 0).await;

    drop(ws);
}

#[tokio::test]
async fn disconnected_client_is_removed_from_registry() {
    let harness = start_gateway(RealtimeConfig::default()).await;

    let mut ws = connect(harness.addr, "alerts").await;
    wait_for_connections(&harness.registry, 1).await;

    ws.send(tungstenite::Message::Close(None)).await.unwrap();
    drop(ws);
    wait_for_connections(&harness.registry, 0).await;
}
