//! Time-bucketed claim tracking in the `dedup_store` collection.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::bucket::{Clock, bucket_label};
use crate::object_key::dedup_key;
use crate::store::{ObjectStore, StoreError};
use crate::types::{DEDUP_COLLECTION, DedupRecord, TimeBucket};

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("failed to read dedup record: {0}")]
    Storage(#[source] StoreError),
    #[error("failed to unmarshal dedup record at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize dedup record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Claim-check operations over the dedup collection.
#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl DedupStore {
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns whether a prior claim exists for the composite key within the
    /// current bucket window, writing the claim on first sight.
    ///
    /// The check-then-put is not atomic: two concurrent first sights may both
    /// insert and both report no prior claim. One extra allowed action per
    /// contention episode is accepted.
    pub async fn check_and_claim(
        &self,
        internal_entity_id: &str,
        dedup_obj_type: &str,
        dedup_obj_id: &str,
        bucket: TimeBucket,
    ) -> Result<bool, DedupError> {
        let label = bucket_label(bucket, self.clock.as_ref());
        let key = dedup_key(internal_entity_id, dedup_obj_type, dedup_obj_id, &label);
        let body = match self.store.get(DEDUP_COLLECTION, &key).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                let record = DedupRecord {
                    time_bucket: bucket,
                };
                let body = serde_json::to_vec(&record).map_err(DedupError::Encode)?;
                self.store
                    .put(DEDUP_COLLECTION, &key, body)
                    .await
                    .map_err(DedupError::Storage)?;
                debug!(bucket = %bucket, %label, "dedup claim recorded");
                return Ok(false);
            }
            Err(err) => return Err(DedupError::Storage(err)),
        };
        let _record: DedupRecord = serde_json::from_slice(&body)
            .map_err(|source| DedupError::Decode { key, source })?;
        Ok(true)
    }
}
