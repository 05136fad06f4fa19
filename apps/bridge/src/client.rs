//! Per-request construction of the platform client.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use snowlink_core::{
    CommandDispatcher, CommandRequest, CommandResponse, DispatchError, FalconClient, FalconConfig,
    InMemoryObjectStore,
};

use crate::config::BridgeConfig;

/// Builds a [`FalconClient`] for one request credential.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn client(&self, access_token: Option<&str>) -> Result<FalconClient>;
}

pub type SharedClientFactory = Arc<dyn ClientFactory>;

/// Production factory: HTTP-backed storage and dispatch against the platform.
pub struct PlatformClientFactory {
    config: FalconConfig,
}

impl PlatformClientFactory {
    pub fn new(config: FalconConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClientFactory for PlatformClientFactory {
    async fn client(&self, access_token: Option<&str>) -> Result<FalconClient> {
        FalconClient::connect(access_token, &self.config).await
    }
}

/// Dispatcher used when no platform connection exists.
struct UnavailableDispatcher;

#[async_trait]
impl CommandDispatcher for UnavailableDispatcher {
    async fn execute(
        &self,
        _request: CommandRequest,
    ) -> Result<Option<CommandResponse>, DispatchError> {
        Err(DispatchError::Transport(anyhow::anyhow!(
            "command dispatch is unavailable without platform credentials"
        )))
    }
}

/// Local factory: one shared in-memory store, no command dispatch. Used when
/// running without platform credentials and by the handler tests.
pub struct LocalClientFactory {
    store: Arc<InMemoryObjectStore>,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl LocalClientFactory {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryObjectStore::new()),
            dispatcher: Arc::new(UnavailableDispatcher),
        }
    }

    /// Replaces the dispatcher; tests use this to script command replies.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

impl Default for LocalClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientFactory for LocalClientFactory {
    async fn client(&self, _access_token: Option<&str>) -> Result<FalconClient> {
        Ok(FalconClient::new(
            self.store.clone(),
            self.dispatcher.clone(),
        ))
    }
}

/// Picks the factory for the configured mode.
pub fn factory_for(config: &BridgeConfig) -> SharedClientFactory {
    if config.production {
        Arc::new(PlatformClientFactory::new(FalconConfig::from_env()))
    } else {
        tracing::warn!(
            "running with in-memory storage, set BRIDGE_PRODUCTION=true for platform storage"
        );
        Arc::new(LocalClientFactory::new())
    }
}
