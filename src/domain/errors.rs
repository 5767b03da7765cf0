//! Error taxonomy for the synchronization layer.
//!
//! Nothing here is fatal to the process. The worst case is a client showing
//! stale data until it reconnects or refetches.

use thiserror::Error;

/// Errors raised by the real-time synchronization layer.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Socket-level failure. Feeds the client's reconnect state machine
    /// unless the disconnect was manual.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed envelope. The message is discarded and processing continues.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Broker unreachable at publish time. Logged and accepted as at-most-once
    /// loss, since the originating mutation already committed durably.
    #[error("publish error: {0}")]
    Publish(String),

    /// Optimistic write rejected by the server. The cache snapshot is rolled
    /// back and the error surfaced to the caller.
    #[error("mutation rejected (status {status}): {message}")]
    Mutation { status: u16, message: String },
}

impl SyncError {
    /// Shorthand for a mutation rejection.
    pub fn mutation(status: u16, message: impl Into<String>) -> Self {
        SyncError::Mutation {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_error_displays_status_and_message() {
        let err = SyncError::mutation(409, "stock quantity conflict");
        assert_eq!(
            format!("{}", err),
            "mutation rejected (status 409): stock quantity conflict"
        );
    }

    #[test]
    fn transport_error_displays_reason() {
        let err = SyncError::Transport("connection reset".to_string());
        assert_eq!(format!("{}", err), "transport error: connection reset");
    }
}
