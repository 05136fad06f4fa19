use std::sync::Arc;

use anyhow::Result;
use snowlink_bridge::client::factory_for;
use snowlink_bridge::config::BridgeConfig;
use snowlink_bridge::http::{AppState, build_router};
use snowlink_bridge::telemetry;
use snowlink_core::SystemClock;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::install("snowlink-bridge")?;
    let config = BridgeConfig::from_env()?;
    let state = AppState {
        clients: factory_for(&config),
        clock: Arc::new(SystemClock),
    };
    let app = build_router(state);

    tracing::info!("snowlink-bridge listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
