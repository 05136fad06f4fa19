//! Credentialed client seam to the Falcon platform.
//!
//! The platform SDK proper is an external collaborator; this module carries
//! the two capabilities the bridge uses: keyed custom storage and the
//! api-integration execute-command dispatch.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::{ObjectStore, StoreError};

/// Default API host when no cloud override is present.
pub const DEFAULT_CLOUD: &str = "api.crowdstrike.com";

/// Connection settings for the platform APIs.
#[derive(Debug, Clone, Default)]
pub struct FalconConfig {
    pub cloud: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl FalconConfig {
    /// Reads the cloud override and fallback credentials from the environment.
    pub fn from_env() -> Self {
        let cloud = std::env::var("FALCON_CLOUD")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLOUD.to_string());
        Self {
            cloud,
            client_id: std::env::var("FALCON_CLIENT_ID").ok(),
            client_secret: std::env::var("FALCON_CLIENT_SECRET").ok(),
        }
    }

    fn base_url(&self) -> String {
        format!("https://{}", self.cloud)
    }
}

/// One execute-command invocation against a named integration.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest {
    pub integration: String,
    pub operation: String,
    pub config_id: String,
    pub payload: Value,
}

/// Raw reply returned by the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub payload: Option<CommandPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandPayload {
    #[serde(default)]
    pub resources: Vec<CommandResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResource {
    #[serde(default)]
    pub response_body: Value,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command request failed: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("failed to decode command reply: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Contract implemented by execute-command dispatchers.
///
/// `Ok(None)` models an empty reply from the platform.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn execute(
        &self,
        request: CommandRequest,
    ) -> Result<Option<CommandResponse>, DispatchError>;
}

/// In-memory dispatcher used in tests.
pub struct InMemoryCommandDispatcher {
    responder:
        Box<dyn Fn(CommandRequest) -> Result<Option<CommandResponse>, DispatchError> + Send + Sync>,
}

impl InMemoryCommandDispatcher {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(CommandRequest) -> Result<Option<CommandResponse>, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Box::new(responder),
        }
    }
}

#[async_trait]
impl CommandDispatcher for InMemoryCommandDispatcher {
    async fn execute(
        &self,
        request: CommandRequest,
    ) -> Result<Option<CommandResponse>, DispatchError> {
        (self.responder)(request)
    }
}

/// Credentialed handle onto the platform capabilities used by the bridge.
#[derive(Clone)]
pub struct FalconClient {
    object_store: Arc<dyn ObjectStore>,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl FalconClient {
    pub fn new(object_store: Arc<dyn ObjectStore>, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            object_store,
            dispatcher,
        }
    }

    /// Builds an HTTP-backed client for `config`, authenticating with the
    /// request token when present or exchanging the configured client
    /// credentials otherwise.
    pub async fn connect(access_token: Option<&str>, config: &FalconConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("build http client")?;
        let token = match access_token.filter(|token| !token.trim().is_empty()) {
            Some(token) => token.to_string(),
            None => oauth_token(&http, config).await?,
        };
        let base_url = config.base_url();
        let object_store = Arc::new(HttpObjectStore {
            http: http.clone(),
            base_url: base_url.clone(),
            token: token.clone(),
        });
        let dispatcher = Arc::new(HttpCommandDispatcher {
            http,
            base_url,
            token,
        });
        Ok(Self::new(object_store, dispatcher))
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    pub fn dispatcher(&self) -> Arc<dyn CommandDispatcher> {
        self.dispatcher.clone()
    }
}

async fn oauth_token(http: &reqwest::Client, config: &FalconConfig) -> Result<String> {
    let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret) else {
        anyhow::bail!("no access token on the request and no client credentials configured");
    };

    #[derive(Deserialize)]
    struct TokenReply {
        access_token: String,
    }

    let reply: TokenReply = http
        .post(format!("{}/oauth2/token", config.base_url()))
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ])
        .send()
        .await
        .context("request oauth token")?
        .error_for_status()
        .context("oauth token rejected")?
        .json()
        .await
        .context("decode oauth token reply")?;
    Ok(reply.access_token)
}

/// Object storage backed by the platform custom-storage API.
struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpObjectStore {
    fn object_url(&self, collection: &str, key: &str) -> String {
        format!(
            "{}/customobjects/v1/collections/{collection}/objects/{key}",
            self.base_url
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .http
            .get(self.object_url(collection, key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| StoreError::Transport(anyhow!(err)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        let body = response
            .error_for_status()
            .map_err(|err| StoreError::Transport(anyhow!(err)))?
            .bytes()
            .await
            .map_err(|err| StoreError::Transport(anyhow!(err)))?;
        Ok(body.to_vec())
    }

    async fn put(&self, collection: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.http
            .put(self.object_url(collection, key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| StoreError::Transport(anyhow!(err)))?
            .error_for_status()
            .map_err(|err| StoreError::Transport(anyhow!(err)))?;
        Ok(())
    }
}

/// Execute-command dispatch over the api-integration plugin surface.
struct HttpCommandDispatcher {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[async_trait]
impl CommandDispatcher for HttpCommandDispatcher {
    async fn execute(
        &self,
        request: CommandRequest,
    ) -> Result<Option<CommandResponse>, DispatchError> {
        let body = serde_json::json!({
            "resources": [{
                "definition_id": request.integration,
                "operation_id": request.operation,
                "id": request.config_id,
                "request": { "json": request.payload },
            }]
        });
        let bytes = self
            .http
            .post(format!("{}/plugins/v2/execute", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| DispatchError::Transport(anyhow!(err)))?
            .error_for_status()
            .map_err(|err| DispatchError::Transport(anyhow!(err)))?
            .bytes()
            .await
            .map_err(|err| DispatchError::Transport(anyhow!(err)))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let reply = serde_json::from_slice(&bytes).map_err(DispatchError::Decode)?;
        Ok(Some(reply))
    }
}
