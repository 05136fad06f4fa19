use std::net::SocketAddr;

use anyhow::{Context, Result};

/// Service configuration read from the environment.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// When false the service runs against in-memory storage and refuses
    /// command dispatch, which keeps the local loop credential-free.
    pub production: bool,
    pub addr: SocketAddr,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let production = std::env::var("BRIDGE_PRODUCTION")
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(true);
        let addr = std::env::var("BIND")
            .unwrap_or_else(|_| "0.0.0.0:8090".into())
            .parse()
            .context("invalid BIND address")?;
        Ok(Self { production, addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_addr_parses() {
        let addr: SocketAddr = "0.0.0.0:8090".parse().unwrap();
        assert_eq!(addr.port(), 8090);
    }
}
