//! Connection registry for the fan-out gateway.
//!
//! Holds every live client connection, sharded per channel so a broadcast
//! on `inventory` never contends with registrations on `price`. Each
//! connection owns an independent bounded outbound queue; broadcasting to N
//! connections is N non-blocking enqueues, so one slow consumer cannot
//! head-of-line block the rest.
//!
//! # Backpressure policy
//!
//! When a connection's queue is full the connection is dropped (evicted and
//! its socket closed), not the message. A client already behind on
//! slow-changing inventory/price data is better served by reconnecting than
//! by silently losing updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::domain::{Channel, EventEnvelope};
use crate::ports::EnvelopeSink;

/// Unique identifier for one client connection.
///
/// Generated server-side on handshake; unique for the connection's lifetime
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side handle for one connection's outbound path.
struct ConnectionHandle {
    /// Bounded queue drained by the connection's writer task. Dropping the
    /// sender closes the queue, which the writer observes as eviction.
    outbound: mpsc::Sender<Arc<str>>,

    /// Unix millis of the last pong (or registration). Updated lock-free so
    /// heartbeat touches don't need the shard write lock.
    last_seen_at: AtomicI64,
}

type Shard = RwLock<HashMap<ConnectionId, ConnectionHandle>>;

/// Result of one broadcast pass over a channel.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Connections the envelope was enqueued to.
    pub delivered: usize,
    /// Connections evicted because their queue was full or closed.
    pub evicted: usize,
}

/// Snapshot of live-connection counts, exposed via the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub connections_by_channel: HashMap<String, usize>,
}

/// Registry of live client connections, sharded per channel.
pub struct ConnectionRegistry {
    shards: [Shard; Channel::ALL.len()],
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// Create a registry with the given per-connection outbound queue
    /// capacity.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            shards: [
                RwLock::new(HashMap::new()),
                RwLock::new(HashMap::new()),
                RwLock::new(HashMap::new()),
            ],
            queue_capacity,
        }
    }

    fn shard(&self, channel: Channel) -> &Shard {
        let index = match channel {
            Channel::Inventory => 0,
            Channel::Price => 1,
            Channel::Alerts => 2,
        };
        &self.shards[index]
    }

    /// Register a new connection subscribed to `channel`.
    ///
    /// Returns the connection id and the receiving end of its outbound
    /// queue; the caller's writer task drains it and closes the socket when
    /// it yields `None` (eviction or unregistration).
    pub async fn register(&self, channel: Channel) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let handle = ConnectionHandle {
            outbound: tx,
            last_seen_at: AtomicI64::new(Utc::now().timestamp_millis()),
        };
        self.shard(channel).write().await.insert(id, handle);

        tracing::info!(channel = %channel, connection_id = %id, "client connected");
        (id, rx)
    }

    /// Remove a connection. Synchronous with close: after this returns the
    /// channel's live-subscriber set no longer contains the connection.
    ///
    /// Idempotent; returns whether the connection was still registered.
    pub async fn unregister(&self, channel: Channel, id: ConnectionId) -> bool {
        let removed = self.shard(channel).write().await.remove(&id).is_some();
        if removed {
            tracing::info!(channel = %channel, connection_id = %id, "client disconnected");
        }
        removed
    }

    /// Record a heartbeat pong from a connection.
    pub async fn touch(&self, channel: Channel, id: ConnectionId) {
        if let Some(handle) = self.shard(channel).read().await.get(&id) {
            handle
                .last_seen_at
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
    }

    /// Unix millis of a connection's last recorded pong, if still registered.
    pub async fn last_seen_at(&self, channel: Channel, id: ConnectionId) -> Option<i64> {
        self.shard(channel)
            .read()
            .await
            .get(&id)
            .map(|h| h.last_seen_at.load(Ordering::Relaxed))
    }

    /// Broadcast an envelope to every connection subscribed to its channel.
    ///
    /// The wire payload is serialized once and shared. Enqueueing uses
    /// `try_send`, so a full or closed queue never delays delivery to other
    /// connections; the offending connection is evicted instead.
    pub async fn broadcast(&self, channel: Channel, envelope: &EventEnvelope) -> BroadcastOutcome {
        let wire: Arc<str> = Arc::from(envelope.to_wire());
        let mut outcome = BroadcastOutcome::default();

        let stale: Vec<ConnectionId> = {
            let shard = self.shard(channel).read().await;
            let mut stale = Vec::new();
            for (id, handle) in shard.iter() {
                match handle.outbound.try_send(Arc::clone(&wire)) {
                    Ok(()) => outcome.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            channel = %channel,
                            connection_id = %id,
                            "outbound queue full, evicting slow client"
                        );
                        stale.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => stale.push(*id),
                }
            }
            stale
        };

        if !stale.is_empty() {
            let mut shard = self.shard(channel).write().await;
            for id in &stale {
                // Dropping the handle closes the outbound queue; the
                // connection's writer task observes this and closes the socket.
                shard.remove(id);
            }
            outcome.evicted = stale.len();
        }

        tracing::debug!(
            channel = %channel,
            delivered = outcome.delivered,
            evicted = outcome.evicted,
            "broadcast complete"
        );
        outcome
    }

    /// Number of live connections on one channel.
    pub async fn channel_count(&self, channel: Channel) -> usize {
        self.shard(channel).read().await.len()
    }

    /// Connection counts, total and per channel.
    pub async fn stats(&self) -> ConnectionStats {
        let mut by_channel = HashMap::new();
        let mut total = 0;
        for channel in Channel::ALL {
            let count = self.channel_count(channel).await;
            by_channel.insert(channel.as_str().to_string(), count);
            total += count;
        }
        ConnectionStats {
            total_connections: total,
            connections_by_channel: by_channel,
        }
    }
}

#[async_trait]
impl EnvelopeSink for ConnectionRegistry {
    async fn deliver(&self, channel: Channel, envelope: EventEnvelope) {
        self.broadcast(channel, &envelope).await;
    }
}
