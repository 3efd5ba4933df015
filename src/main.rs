use std::sync::Arc;

use fuel_dispatch::api::rest::router;
use fuel_dispatch::config::Config;
use fuel_dispatch::engine::maintenance::run_maintenance;
use fuel_dispatch::error::AppError;
use fuel_dispatch::state::AppState;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let http_port = config.http_port;
    let sweep_every = Duration::from_secs(config.sweep_interval_secs);
    let shared_state = Arc::new(AppState::new(config));

    let app = router(shared_state.clone());

    tokio::spawn(run_maintenance(shared_state.clone(), sweep_every));

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
