//! Caching layer: the [`Cache`] capability, an in-memory implementation,
//! the two-level request/fetch cache, and content-addressed cache keys.

mod key;
mod memory;
mod two_level;

use std::time::Duration;

pub use key::{build_cache_key, canonical_json};
pub use memory::MemoryCache;
pub use two_level::{CacheLayer, TwoLevelCache};

use crate::error::CacheError;

/// Byte-oriented key/value store with per-entry TTL.
pub trait Cache: Send + Sync {
    /// Stored bytes, or `None` when missing or expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str);

    fn clear(&self);
}
