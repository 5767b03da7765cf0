//! Stockwatch gateway binary.
//!
//! Composition root: loads configuration, subscribes to the broker, and
//! serves the WebSocket fan-out endpoints plus a health endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stockwatch::adapters::redis::run_subscriber;
use stockwatch::config::AppConfig;
use stockwatch::gateway::{ws_router, ConnectionRegistry, GatewayState};
use stockwatch::ports::EnvelopeSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);
    tracing::info!(
        environment = ?config.server.environment,
        addr = %config.server.socket_addr(),
        "starting stockwatch gateway"
    );

    let registry = Arc::new(ConnectionRegistry::new(config.realtime.queue_capacity));

    // Broker subscription feeds the registry until shutdown.
    let cancel = CancellationToken::new();
    let subscriber = tokio::spawn(run_subscriber(
        config.redis.clone(),
        Arc::clone(&registry) as Arc<dyn EnvelopeSink>,
        cancel.clone(),
    ));

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(Arc::clone(&registry))
        .merge(ws_router(GatewayState::new(
            Arc::clone(&registry),
            config.realtime.clone(),
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    tracing::info!(addr = %config.server.socket_addr(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    let _ = subscriber.await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.server.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = config.server.cors_origins_list();
    if origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any);
    }

    let parsed: Vec<http::HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "stockwatch",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(registry): State<Arc<ConnectionRegistry>>) -> Json<serde_json::Value> {
    let stats = registry.stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "connections": stats,
    }))
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
