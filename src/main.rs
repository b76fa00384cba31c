use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use control_plane_api::clock::SystemClock;
use control_plane_api::config::config;
use control_plane_api::server;
use control_plane_api::state::{open_store, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting control plane in {:?} mode", config.environment);

    let store = open_store(config).await?;
    let state = AppState::new(config, store, Arc::new(SystemClock))?;

    server::spawn_sweeper(
        state.clone(),
        Duration::from_secs(config.licensing.expire_sweep_interval_secs),
    );

    let app = server::app(state, config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Control plane listening on http://{}", bind_addr);

    server::serve(listener, app).await.context("server error")
}
