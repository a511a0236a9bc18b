mod routes;
mod state;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tablefeed_core::Config;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    let state = AppState::new(config)?;

    let app = Router::new()
        .route(&state.config.primary_route, get(routes::primary_feed))
        .route(&state.config.merged_route, get(routes::merged_feed))
        .with_state(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        addr = %addr,
        primary = %state.config.primary_route,
        merged = %state.config.merged_route,
        "tablefeed listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
