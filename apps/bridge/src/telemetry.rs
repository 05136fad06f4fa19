//! tracing installation for the bridge service.

use anyhow::Result;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber with env-filter. JSON output by default,
/// plain text when `LOG_FORMAT=text`.
pub fn install(service_name: &str) -> Result<()> {
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|value| value != "text")
        .unwrap_or(true);
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
    tracing::debug!(service = service_name, "telemetry installed");
    Ok(())
}
