use anyhow::{Context, Result};
use axum::{
    routing::{delete, get},
    Router,
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, AppState},
    logging::{LogEngine, LoggingLevel},
    metrics,
    signals::setup_signal_handlers,
};

/// Start the log engine HTTP server
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the log database
/// 3. Sets up signal handlers for graceful shutdown
/// 4. Serves the API until a shutdown signal arrives
/// 5. Drains the log engine before returning
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let engine = Arc::new(LogEngine::open(config.database.clone()).await);
    engine.log_system_event(Utc::now(), true, LoggingLevel::Info);

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let app = create_router(AppState {
        engine: Arc::clone(&engine),
        metrics: metrics_handle,
    });

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid server host '{}'", config.server.host))?,
        config.server.port,
    ));

    info!("Starting log engine server on {}", addr);
    info!(
        "Database: {} (max entries: {})",
        config.database.path,
        config
            .database
            .max_entries_limit()
            .map_or_else(|| "unlimited".to_string(), |m| m.to_string())
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;

    engine.log_system_event(Utc::now(), false, LoggingLevel::Info);
    engine.shutdown().await;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .route(
            "/api/v1/logs",
            get(handlers::logs_api::get_logs).delete(handlers::logs_api::clear_logs),
        )
        .route("/api/v1/logs/things", get(handlers::logs_api::get_things))
        .route(
            "/api/v1/logs/things/:thing_id",
            delete(handlers::logs_api::delete_thing_logs),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[tokio::test]
    async fn test_create_router() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let engine = Arc::new(LogEngine::open(DatabaseConfig::in_memory()).await);

        let _app = create_router(AppState {
            engine: Arc::clone(&engine),
            metrics: Arc::new(recorder.handle()),
        });
        // Router created successfully - no panic

        engine.shutdown().await;
    }
}
