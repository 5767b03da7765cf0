//! Real-time layer configuration
//!
//! Tunables for the fan-out gateway (outbound queue capacity, heartbeat)
//! and the client transport (reconnect backoff policy).

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration for the gateway and client transport.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each connection's bounded outbound queue.
    ///
    /// When a connection's queue fills up the connection is evicted
    /// (dropped), not the message. See the gateway backpressure policy.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Interval between server-initiated pings, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Number of consecutive missed pongs before a connection is evicted.
    #[serde(default = "default_missed_pong_limit")]
    pub missed_pong_limit: u32,

    /// Base delay for client reconnect backoff, in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Upper bound on client reconnect backoff, in milliseconds.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,

    /// Maximum reconnect attempts before the transport gives up and
    /// stays disconnected until a manual `connect()`.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms)
    }

    /// Validate real-time configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidHeartbeatInterval);
        }
        if self.missed_pong_limit == 0 {
            return Err(ValidationError::InvalidMissedPongLimit);
        }
        if self.reconnect_base_ms == 0 {
            return Err(ValidationError::InvalidReconnectBase);
        }
        if self.reconnect_cap_ms < self.reconnect_base_ms {
            return Err(ValidationError::InvalidReconnectCap);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            missed_pong_limit: default_missed_pong_limit(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_missed_pong_limit() -> u32 {
    3
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}
