//! Client-side synchronization: transport, routing, cache, reconciler.
//!
//! A dashboard client wires these together as:
//! transport events -> [`spawn_apply_loop`] -> [`Reconciler`] -> cache.

pub mod cache;
pub mod reconciler;
pub mod router;
pub mod transport;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub use cache::{CacheEntry, CacheStore};
pub use reconciler::Reconciler;
pub use router::{route, subscribed_channels, RouteOutcome};
pub use transport::{ReconnectPolicy, SyncTransport, TransportEvent, TransportState};

/// Spawn the task that applies transport events to the reconciler.
///
/// Envelopes are applied strictly in the order the transport delivered
/// them. A lagged receiver means events were lost to backpressure; the
/// cache may then miss updates, which staleness-driven refetch corrects.
/// The task ends when the transport's event channel closes.
pub fn spawn_apply_loop(
    transport: &SyncTransport,
    reconciler: Arc<Reconciler>,
) -> JoinHandle<()> {
    let mut rx = transport.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(TransportEvent::Envelope(envelope)) => {
                    reconciler.apply_event(&envelope).await;
                }
                Ok(TransportEvent::Open) => {
                    tracing::info!("transport open, cache updates resuming");
                }
                Ok(TransportEvent::Closed) => {
                    tracing::info!("transport closed, cache updates paused");
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "apply loop lagged, some events were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("apply loop exiting");
    })
}
