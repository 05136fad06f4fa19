//! Storage key derivation and sanitization.
//!
//! The storage backend restricts keys to `[A-Za-z0-9._-]`; callers pass
//! identifiers drawn from external systems that may contain `/`, `:`, `@`
//! and similar.

use md5::{Digest, Md5};
use thiserror::Error;

/// Storage keys may not exceed this many characters.
pub const MAX_OBJECT_KEY_LEN: usize = 1000;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("object key exceeds maximum length: {len} > 1000")]
    TooLong { len: usize },
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Total on its input: distinct inputs differing only in forbidden
/// characters may collide.
pub fn sanitize_object_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derives the tracked-entities key for an entity within an external system.
pub fn tracked_entity_key(
    external_system_id: &str,
    internal_entity_id: &str,
) -> Result<String, KeyError> {
    let key = sanitize_object_key(&format!("{external_system_id}.{internal_entity_id}"));
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(KeyError::TooLong { len: key.len() });
    }
    Ok(key)
}

/// Derives the dedup-store key for a claim within a bucket window.
///
/// MD5 here is a deterministic keying hash, not a security primitive; the
/// hex digest is already within the storage charset so no sanitization runs.
pub fn dedup_key(
    internal_entity_id: &str,
    dedup_obj_type: &str,
    dedup_obj_id: &str,
    bucket_label: &str,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(
        format!("{internal_entity_id}:{dedup_obj_type}:{dedup_obj_id}:{bucket_label}").as_bytes(),
    );
    hex::encode(hasher.finalize())
}
