//! Keyed object storage seam.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {collection}/{key}")]
    NotFound { collection: String, key: String },
    #[error("storage request failed: {0}")]
    Transport(#[source] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Contract implemented by object storage backends. Records for the same
/// key are shared across invocations; the backend arbitrates last-write-wins.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches the object body at `key`, or [`StoreError::NotFound`].
    async fn get(&self, collection: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes the object body at `key`, overwriting any previous version.
    async fn put(&self, collection: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;
}

/// In-memory store used by tests and when running without platform
/// credentials.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, collection: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.objects
            .write()
            .await
            .insert((collection.to_string(), key.to_string()), body);
        Ok(())
    }
}
