//! Deterministic cache keys for requests and fetch inputs.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// `hex(sha256(canonical_json(value)))`.
///
/// Structurally identical values always produce the same key, whatever the
/// iteration order of any maps they contain.
pub fn build_cache_key<T>(value: &T) -> Result<String, CacheError>
where
    T: Serialize + ?Sized,
{
    let canonical = canonical_json(value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest))
}

/// JSON text of `value` with every object's keys sorted.
pub fn canonical_json<T>(value: &T) -> Result<String, CacheError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&sorted(value))?)
}

// `serde_json::Map` keeps insertion order when `preserve_order` is enabled
// anywhere in the dependency graph, so keys are re-inserted in sorted order.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            let mut sorted_map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted_map.insert(key, sorted(value));
            }
            Value::Object(sorted_map)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}
