//! Pulse Realtime Server
//!
//! Main entry point that wires the presence registry, room dispatcher, and
//! WebSocket endpoint together and starts the server.

use std::sync::Arc;

use tracing;
use tracing_subscriber::{fmt, EnvFilter};

use pulse_core::config::AppConfig;
use pulse_core::error::AppError;
use pulse_realtime::directory::{InMemoryDirectory, InMemoryPresenceStore};
use pulse_realtime::server::RealtimeEngine;

#[tokio::main]
async fn main() {
    let env = std::env::var("PULSE_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Pulse realtime server v{}", env!("CARGO_PKG_VERSION"));

    // The profile/CRUD service will provide real collaborators; until then
    // the server runs against the in-memory implementations.
    let directory = Arc::new(InMemoryDirectory::new());
    let store = Arc::new(InMemoryPresenceStore::new());

    let engine = Arc::new(RealtimeEngine::new(
        config.realtime.clone(),
        config.presence.clone(),
        directory,
        store,
    ));

    let app = pulse_realtime::socket::router(engine.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Pulse realtime server listening on {}", addr);

    let shutdown_engine = engine.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        shutdown_engine.shutdown().await;
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    tracing::info!("Pulse realtime server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
