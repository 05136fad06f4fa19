//! Shared value types and integration constants.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Collection holding entity-to-ticket mappings.
pub const TRACKED_ENTITIES_COLLECTION: &str = "tracked_entities";

/// Collection holding bucketed throttle claims.
pub const DEDUP_COLLECTION: &str = "dedup_store";

/// Named api-integration the incident operations execute against.
pub const ITSM_INTEGRATION: &str = "servicenow_itsm";

/// Sentinel external-system id for the standard incident class.
pub const INCIDENT_SYSTEM_ID: &str = "servicenow_incident";

/// Sentinel external-system id for the security-incident class.
pub const SIR_INCIDENT_SYSTEM_ID: &str = "servicenow_sir_incident";

/// A persisted binding between an internal entity and the ticket it was
/// materialized into within one external system.
///
/// For any `(external_system_id, internal_entity_id)` pair at most one
/// record exists in the tracked-entities collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    #[serde(default)]
    pub internal_entity_id: String,
    #[serde(default)]
    pub external_entity_id: String,
    #[serde(default)]
    pub external_system_id: String,
}

/// Stored claim marking a dedup key as used within a bucket window.
///
/// The stored `time_bucket` always equals the bucket that was active when
/// the claim was written; the record is never mutated and falls out of use
/// when the bucket label rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub time_bucket: TimeBucket,
}

/// Throttle windows accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBucket {
    #[serde(rename = "forever")]
    Forever,
    #[serde(rename = "5 minutes")]
    FiveMinutes,
    #[serde(rename = "30 minutes")]
    ThirtyMinutes,
}

impl TimeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Forever => "forever",
            TimeBucket::FiveMinutes => "5 minutes",
            TimeBucket::ThirtyMinutes => "30 minutes",
        }
    }
}

impl Display for TimeBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error(
    "unsupported time bucket value {value:?}, accepted values: forever, 5 minutes, 30 minutes"
)]
pub struct ParseTimeBucketError {
    pub value: String,
}

impl FromStr for TimeBucket {
    type Err = ParseTimeBucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forever" => Ok(TimeBucket::Forever),
            "5 minutes" => Ok(TimeBucket::FiveMinutes),
            "30 minutes" => Ok(TimeBucket::ThirtyMinutes),
            other => Err(ParseTimeBucketError {
                value: other.to_string(),
            }),
        }
    }
}
