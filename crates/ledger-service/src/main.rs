//! Credit ledger service - HTTP API for credits and API key metering.
//!
//! This is the main entry point for the ledger service.

use std::future::Future;
use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_service::rate_limit::SWEEP_INTERVAL;
use ledger_service::{create_router, AppState, ServiceConfig};
use ledger_store::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting credit ledger service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_url = %config.database_url,
        commission_bps = config.commission_bps,
        admin_configured = %config.admin_api_key.is_some(),
        rate_limit_max = config.rate_limit_max,
        "Service configuration loaded"
    );

    // Open the SQLite store and apply migrations
    let store = SqliteStore::open(&config.store_config()).await?;

    // Build app state
    let state = AppState::new(store, config.clone())?;
    let _sweeper = state.rate_limiter.spawn_sweeper(SWEEP_INTERVAL);

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    wait_for(tokio::signal::ctrl_c()).await;
}

/// Resolve once `signal` fires. A listener that fails to install never
/// resolves, so the server keeps running instead of draining at startup.
async fn wait_for(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(err) = signal.await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
