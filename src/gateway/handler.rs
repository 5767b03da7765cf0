//! WebSocket upgrade handler for real-time push connections.
//!
//! Handles the HTTP → WebSocket upgrade and the connection lifecycle:
//! 1. Resolve the channel from the endpoint path (`/ws/inventory`, ...)
//! 2. Upgrade and register the connection in the registry
//! 3. Drain the outbound queue to the socket; send heartbeat pings
//! 4. Evict on missed pongs, write errors, or queue overflow
//! 5. Unregister synchronously with close

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};

use crate::config::RealtimeConfig;
use crate::domain::Channel;

use super::registry::{ConnectionId, ConnectionRegistry};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ConnectionRegistry>,
    pub realtime: RealtimeConfig,
}

impl GatewayState {
    pub fn new(registry: Arc<ConnectionRegistry>, realtime: RealtimeConfig) -> Self {
        Self { registry, realtime }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws/:channel` where `:channel` is one of the static channel
/// names. The handshake carries no payload beyond the channel selection
/// implied by the path.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<GatewayState>,
) -> Response {
    let Some(channel) = Channel::from_path_segment(&channel) else {
        return Response::builder()
            .status(404)
            .body("Unknown channel".into())
            .unwrap_or_default();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, channel, state))
}

/// Run one established connection until it closes or is evicted.
async fn handle_socket(socket: WebSocket, channel: Channel, state: GatewayState) {
    let (id, outbound_rx) = state.registry.register(channel).await;
    let (sender, receiver) = socket.split();

    // Consecutive pings without a pong. Reader resets, writer increments.
    let missed_pongs = Arc::new(AtomicU32::new(0));

    let mut send_task = tokio::spawn(write_loop(
        sender,
        outbound_rx,
        channel,
        id,
        state.realtime.clone(),
        Arc::clone(&missed_pongs),
    ));

    let mut recv_task = tokio::spawn(read_loop(
        receiver,
        channel,
        id,
        Arc::clone(&state.registry),
        missed_pongs,
    ));

    // Whichever side finishes first tears down the other.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Closed connections leave the subscriber set synchronously, not lazily.
    state.registry.unregister(channel, id).await;
}

/// Drain the outbound queue to the socket and emit heartbeat pings.
///
/// Ends when the queue is closed (eviction or shutdown), a write fails, or
/// the client misses too many consecutive pongs.
async fn write_loop(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: tokio::sync::mpsc::Receiver<Arc<str>>,
    channel: Channel,
    id: ConnectionId,
    realtime: RealtimeConfig,
    missed_pongs: Arc<AtomicU32>,
) {
    let mut ping_interval = tokio::time::interval(realtime.heartbeat_interval());
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so pings start one
    // full interval after the handshake.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sender.send(Message::Text(text.to_string())).await {
                        tracing::debug!(
                            channel = %channel,
                            connection_id = %id,
                            error = %e,
                            "socket write failed, evicting"
                        );
                        break;
                    }
                }
                None => {
                    // Queue closed: evicted by the registry or shutting down.
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping_interval.tick() => {
                if missed_pongs.load(Ordering::Relaxed) >= realtime.missed_pong_limit {
                    tracing::warn!(
                        channel = %channel,
                        connection_id = %id,
                        limit = realtime.missed_pong_limit,
                        "missed pong limit reached, evicting"
                    );
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                missed_pongs.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Consume inbound frames: track pongs, ignore everything else.
///
/// Clients do not send domain messages over the push socket; mutations go
/// through the REST layer.
async fn read_loop(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    channel: Channel,
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    missed_pongs: Arc<AtomicU32>,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Pong(_)) => {
                missed_pongs.store(0, Ordering::Relaxed);
                registry.touch(channel, id).await;
            }
            Ok(Message::Ping(_)) => {
                // Protocol ping; axum replies with a pong automatically.
            }
            Ok(Message::Text(text)) => {
                tracing::trace!(
                    channel = %channel,
                    connection_id = %id,
                    len = text.len(),
                    "ignoring inbound text frame"
                );
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!(
                    channel = %channel,
                    connection_id = %id,
                    "received unsupported binary message"
                );
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(channel = %channel, connection_id = %id, "client sent close frame");
                break;
            }
            Err(e) => {
                tracing::debug!(
                    channel = %channel,
                    connection_id = %id,
                    error = %e,
                    "receive error"
                );
                break;
            }
        }
    }
}

/// Create the axum router for the WebSocket endpoints.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .merge(gateway::ws_router(gateway_state));
/// ```
pub fn ws_router(state: GatewayState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/ws/:channel", get(ws_handler))
        .with_state(state)
}
