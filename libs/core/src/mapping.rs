//! Lifecycle of entity-to-ticket mappings in the `tracked_entities`
//! collection.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::object_key::{KeyError, tracked_entity_key};
use crate::store::{ObjectStore, StoreError};
use crate::types::{TRACKED_ENTITIES_COLLECTION, TrackedEntity};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to read tracked entity: {0}")]
    Storage(#[source] StoreError),
    #[error("failed to unmarshal tracked entity at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize tracked entity: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Mapping operations over the tracked-entities collection.
#[derive(Clone)]
pub struct MappingStore {
    store: Arc<dyn ObjectStore>,
}

impl MappingStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Looks up the mapping for `internal_entity_id`, scoped to
    /// `external_system_id` when it is non-empty.
    ///
    /// A stored record carrying a different external system resolves to
    /// `None`: the collection keeps one record per key while callers observe
    /// one per class.
    pub async fn lookup(
        &self,
        internal_entity_id: &str,
        external_system_id: &str,
    ) -> Result<Option<TrackedEntity>, MappingError> {
        let key = tracked_entity_key(external_system_id, internal_entity_id)?;
        let body = match self.store.get(TRACKED_ENTITIES_COLLECTION, &key).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(MappingError::Storage(err)),
        };
        let record: TrackedEntity = serde_json::from_slice(&body)
            .map_err(|source| MappingError::Decode { key, source })?;
        if !external_system_id.is_empty() && record.external_system_id != external_system_id {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Writes `record`, overwriting any previous mapping at the same key.
    pub async fn upsert(&self, record: &TrackedEntity) -> Result<(), MappingError> {
        let key = tracked_entity_key(&record.external_system_id, &record.internal_entity_id)?;
        let body = serde_json::to_vec(record).map_err(MappingError::Encode)?;
        self.store
            .put(TRACKED_ENTITIES_COLLECTION, &key, body)
            .await
            .map_err(MappingError::Storage)?;
        info!(
            internal_entity_id = %record.internal_entity_id,
            external_entity_id = %record.external_entity_id,
            external_system_id = %record.external_system_id,
            "tracked entity mapping stored"
        );
        Ok(())
    }
}
