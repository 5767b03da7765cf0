//! Fan-out gateway - per-channel WebSocket broadcast.
//!
//! The gateway owns the server side of the push pipeline: the connection
//! registry with its bounded per-connection queues, and the axum handler
//! that upgrades HTTP requests and runs the socket lifecycle.

pub mod handler;
pub mod registry;

pub use handler::{ws_router, GatewayState};
pub use registry::{BroadcastOutcome, ConnectionId, ConnectionRegistry, ConnectionStats};
