//! Redis-backed broker publisher for production deployments.
//!
//! Uses Redis PUBLISH on a multiplexed connection. Redis preserves
//! publish order per channel, which is what gives subscribers per-topic
//! FIFO delivery.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::config::RedisConfig;
use crate::domain::SyncError;
use crate::ports::BrokerPublisher;

/// Publishes serialized envelopes to Redis pub/sub channels.
#[derive(Clone)]
pub struct RedisBrokerPublisher {
    conn: MultiplexedConnection,
}

impl RedisBrokerPublisher {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Open a multiplexed connection from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Publish`] when the Redis URL is invalid or
    /// the server is unreachable.
    pub async fn connect(config: &RedisConfig) -> Result<Self, SyncError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| SyncError::Publish(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| SyncError::Publish(e.to_string()))?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl BrokerPublisher for RedisBrokerPublisher {
    async fn publish_raw(&self, topic: &str, payload: String) -> Result<(), SyncError> {
        let mut conn = self.conn.clone();

        // PUBLISH returns the receiver count; zero subscribers is normal.
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| SyncError::Publish(e.to_string()))?;

        tracing::trace!(topic, receivers, "published to redis");
        Ok(())
    }
}

impl std::fmt::Debug for RedisBrokerPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBrokerPublisher").finish_non_exhaustive()
    }
}
