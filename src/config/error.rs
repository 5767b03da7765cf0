//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Outbound queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("Heartbeat interval must be at least 1 second")]
    InvalidHeartbeatInterval,

    #[error("Missed-pong limit must be at least 1")]
    InvalidMissedPongLimit,

    #[error("Reconnect base interval must be non-zero")]
    InvalidReconnectBase,

    #[error("Reconnect cap must be >= base interval")]
    InvalidReconnectCap,
}
