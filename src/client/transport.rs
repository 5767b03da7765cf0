//! Client transport - reconnecting WebSocket subscription.
//!
//! Maintains one WebSocket connection to a gateway channel endpoint and
//! streams parsed envelopes through a [`tokio::sync::broadcast`] channel.
//! Unexpected drops trigger automatic reconnection with exponential
//! backoff; a manual [`disconnect`](SyncTransport::disconnect) does not.
//!
//! The driver task owns the socket, so envelopes are forwarded to
//! subscribers in exactly the order the socket delivered them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::RealtimeConfig;
use crate::domain::EventEnvelope;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── State machine ────────────────────────────────────────────────────

/// Connection lifecycle state, observable via [`SyncTransport::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No connection and no driver running.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open; envelopes are flowing.
    Connected,
    /// The connection dropped unexpectedly; waiting out the backoff
    /// delay before the next attempt.
    Reconnecting,
}

/// Events emitted to transport subscribers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The socket opened (initial connect or reconnect).
    Open,
    /// The socket closed, cleanly or not.
    Closed,
    /// One parsed envelope, in arrival order.
    Envelope(EventEnvelope),
}

// ── Backoff policy ───────────────────────────────────────────────────

/// Exponential backoff parameters for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Consecutive failed attempts before the driver gives up and the
    /// transport stays disconnected until the next manual connect.
    pub max_attempts: u32,
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            base: config.reconnect_base(),
            cap: config.reconnect_cap(),
            max_attempts: config.reconnect_max_attempts,
        }
    }
}

/// Deterministic backoff schedule: `min(base * 2^attempt, cap)`.
///
/// No jitter. Delays must be predictable so the reconnect behavior of a
/// dashboard client can be reasoned about (and tested) exactly.
fn backoff_delay(attempt: u32, policy: &ReconnectPolicy) -> Duration {
    let shift = attempt.min(32);
    let raw_ms = (policy.base.as_millis()).saturating_mul(1u128 << shift);
    let capped_ms = raw_ms.min(policy.cap.as_millis());
    Duration::from_millis(capped_ms as u64)
}

// ── SyncTransport ────────────────────────────────────────────────────

/// Why a single connection ended.
enum CloseReason {
    /// Cancellation token fired (manual disconnect or shutdown).
    Manual,
    /// Close frame, stream end, or socket error.
    Dropped,
}

struct Shared {
    url: Url,
    policy: ReconnectPolicy,
    state: Mutex<TransportState>,
    /// Writer handle into the live socket, present only while connected.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    events: broadcast::Sender<TransportEvent>,
    /// Token for the currently running driver task, if any.
    cancel: Mutex<Option<CancellationToken>>,
    /// Bumped by every `connect()`. A driver whose generation no longer
    /// matches has been superseded and must not touch shared state; the
    /// superseded driver's teardown would otherwise race a fresh
    /// driver's setup and clobber its outbound sender and state.
    generation: AtomicU64,
}

impl Shared {
    /// Set the state only if `generation` is still the live one. The
    /// generation is re-checked under the state lock, so a concurrent
    /// `connect()` (which bumps the generation while holding the same
    /// lock) cannot interleave between the check and the write.
    fn set_state_if_current(&self, generation: u64, next: TransportState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(to = ?next, "stale driver, skipping state change");
            return;
        }
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "transport state change");
            *state = next;
        }
    }

    fn store_outbound(&self, generation: u64, tx: mpsc::UnboundedSender<String>) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) == generation {
            *outbound = Some(tx);
        }
    }

    fn clear_outbound(&self, generation: u64) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) == generation {
            outbound.take();
        }
    }

    fn emit(&self, event: TransportEvent) {
        // No subscribers is fine; the event stream is observational.
        let _ = self.events.send(event);
    }
}

/// Reconnecting WebSocket transport for one gateway channel endpoint.
///
/// Cheaply cloneable; all clones share the same connection and state.
#[derive(Clone)]
pub struct SyncTransport {
    shared: Arc<Shared>,
}

impl SyncTransport {
    pub fn new(url: Url, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                url,
                policy,
                state: Mutex::new(TransportState::Disconnected),
                outbound: Mutex::new(None),
                events,
                cancel: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Get a new receiver for the transport event stream.
    ///
    /// Slow consumers receive [`broadcast::error::RecvError::Lagged`]
    /// rather than stalling the driver.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_sender().subscribe()
    }

    fn events_sender(&self) -> &broadcast::Sender<TransportEvent> {
        &self.shared.events
    }

    /// Start the driver task if one is not already running.
    ///
    /// Idempotent: calling while connecting, connected, or reconnecting
    /// is a no-op.
    pub fn connect(&self) {
        let mut slot = self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(token) = slot.as_ref() {
            if !token.is_cancelled() {
                tracing::debug!(url = %self.shared.url, "transport already running, ignoring connect");
                return;
            }
        }

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        // Supersede any still-winding-down driver before taking over its
        // state. Bumping under the state lock closes the window where a
        // stale driver's exit path could pass its generation check and
        // then overwrite the new driver's state.
        let generation = {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = TransportState::Connecting;
            generation
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            drive(shared, token, generation).await;
        });
    }

    /// Stop the driver and close the socket. Does not reconnect.
    ///
    /// Idempotent: disconnecting while already disconnected is a no-op.
    pub fn disconnect(&self) {
        let slot = self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }

    /// Send a text frame to the gateway, best effort.
    ///
    /// Dropped with a warning when the transport is not connected. The
    /// push socket carries no client-originated domain messages, so a
    /// dropped frame never affects correctness.
    pub fn send(&self, text: String) {
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let sent = match outbound.as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        };
        drop(outbound);

        if !sent {
            tracing::warn!(
                url = %self.shared.url,
                state = ?self.state(),
                "transport not connected, dropping outbound frame"
            );
        }
    }
}

// ── Driver loop ──────────────────────────────────────────────────────

/// Main loop: connect, read until drop, back off, reconnect.
///
/// The attempt counter resets to zero after every successful connection,
/// so the first delay after an established connection drops is always
/// the base delay.
async fn drive(shared: Arc<Shared>, cancel: CancellationToken, generation: u64) {
    let mut attempt: u32 = 0;

    loop {
        shared.set_state_if_current(generation, TransportState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(shared.url.as_str()) => result,
        };

        match connected {
            Ok((ws_stream, _response)) => {
                tracing::info!(url = %shared.url, "transport connected");
                attempt = 0;

                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                shared.store_outbound(generation, outbound_tx);
                shared.set_state_if_current(generation, TransportState::Connected);
                shared.emit(TransportEvent::Open);

                let reason = run_connection(ws_stream, outbound_rx, &shared, &cancel).await;

                shared.clear_outbound(generation);
                shared.emit(TransportEvent::Closed);

                if matches!(reason, CloseReason::Manual) {
                    break;
                }
                tracing::warn!(url = %shared.url, "transport connection dropped");
            }
            Err(e) => {
                tracing::warn!(url = %shared.url, error = %e, attempt, "transport connect failed");
            }
        }

        if attempt >= shared.policy.max_attempts {
            tracing::error!(
                url = %shared.url,
                max_attempts = shared.policy.max_attempts,
                "reconnect attempt limit reached, giving up"
            );
            break;
        }

        shared.set_state_if_current(generation, TransportState::Reconnecting);
        let delay = backoff_delay(attempt, &shared.policy);
        tracing::info!(
            url = %shared.url,
            delay_ms = delay.as_millis() as u64,
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }

    // Marks the driver as finished so a later connect() can restart it.
    // If connect() already superseded this driver, the state belongs to
    // the new one and is left alone.
    cancel.cancel();
    shared.set_state_if_current(generation, TransportState::Disconnected);
    tracing::debug!(url = %shared.url, generation, "transport driver exiting");
}

/// Run one established connection until it drops or is cancelled.
async fn run_connection(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    shared: &Shared,
    cancel: &CancellationToken,
) -> CloseReason {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return CloseReason::Manual;
            }
            Some(text) = outbound_rx.recv() => {
                if let Err(e) = write.send(tungstenite::Message::Text(text)).await {
                    tracing::warn!(error = %e, "transport write failed");
                    return CloseReason::Dropped;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        // One bad frame never takes down the stream.
                        match EventEnvelope::from_wire(&text) {
                            Ok(envelope) => shared.emit(TransportEvent::Envelope(envelope)),
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed frame");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite replies with a pong automatically
                        tracing::trace!("transport ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "transport close frame received");
                        return CloseReason::Dropped;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transport read error");
                        return CloseReason::Dropped;
                    }
                    None => {
                        tracing::info!("transport stream ended");
                        return CloseReason::Dropped;
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
