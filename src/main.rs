use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gatekeep::routes::MOVIES_READ;
use gatekeep::{AppState, Config, MemoryStore, User, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting gatekeep v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        limiter_enabled = config.limiter.enabled,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let store = Arc::new(MemoryStore::new());
    if let Some(token) = &config.demo_token {
        seed_demo_user(&store, token).await;
    }

    let state = AppState::new(config.clone(), store.clone(), store);
    state.spawn_background_tasks();
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("  GET  /v1/healthcheck  - Health check");
    info!("  GET  /v1/users/me     - Current user (activated)");
    info!("  GET  /v1/movies       - Movies ({MOVIES_READ})");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn seed_demo_user(store: &MemoryStore, token: &str) {
    store
        .insert_user(User::new(1, "Demo User", "demo@example.test", true))
        .await;
    store.insert_token(token, 1).await;
    store.grant(1, [MOVIES_READ]).await;
    info!(user_id = 1, "Seeded demo user from DEMO_TOKEN");
}
