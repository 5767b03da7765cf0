//! Redis pub/sub subscriber feeding the fan-out gateway.
//!
//! One background task holds a dedicated pub/sub connection subscribed to
//! every channel topic. Messages are parsed and handed to the
//! [`EnvelopeSink`] one at a time, preserving the broker's per-topic
//! order. Connection loss triggers a reconnect loop with a fixed delay;
//! events published while disconnected are lost, which the at-most-once
//! delivery contract allows.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::RedisConfig;
use crate::domain::{Channel, EventEnvelope};
use crate::ports::EnvelopeSink;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Run the subscriber until the cancellation token fires.
///
/// Spawned once at startup by the composition root.
pub async fn run_subscriber(
    config: RedisConfig,
    sink: Arc<dyn EnvelopeSink>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = subscribe_and_pump(&config, sink.as_ref(), &cancel) => {
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "redis subscription lost, reconnecting");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    tracing::debug!("redis subscriber exiting");
}

/// Subscribe to all channel topics and pump messages into the sink.
///
/// Returns `Ok(())` only on cancellation; any connection failure returns
/// the error so the outer loop reconnects.
async fn subscribe_and_pump(
    config: &RedisConfig,
    sink: &dyn EnvelopeSink,
    cancel: &CancellationToken,
) -> Result<(), redis::RedisError> {
    let client = redis::Client::open(config.url.as_str())?;
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();

    for channel in Channel::ALL {
        pubsub.subscribe(channel.topic()).await?;
    }
    tracing::info!(topics = ?Channel::ALL.map(|c| c.topic()), "subscribed to redis topics");

    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            message = stream.next() => {
                let Some(message) = message else {
                    return Err(redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "pub/sub stream ended",
                    )));
                };
                dispatch(&message, sink).await;
            }
        }
    }
}

/// Parse one broker message and deliver it. Malformed messages are
/// logged and skipped; they never tear down the subscription.
async fn dispatch(message: &redis::Msg, sink: &dyn EnvelopeSink) {
    let topic = message.get_channel_name();
    let Some(channel) = Channel::from_topic(topic) else {
        tracing::warn!(topic, "message on unexpected topic, skipping");
        return;
    };

    let payload: String = match message.get_payload() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(topic, error = %e, "non-text payload, skipping");
            return;
        }
    };

    match EventEnvelope::from_wire(&payload) {
        Ok(envelope) => sink.deliver(channel, envelope).await,
        Err(e) => {
            tracing::warn!(topic, error = %e, "malformed envelope, skipping");
        }
    }
}
