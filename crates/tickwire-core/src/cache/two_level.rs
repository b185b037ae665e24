//! Two-level cache: a request-dedup layer used by the executor and a
//! fetch-result layer used by the manager, each with its own TTL.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Cache, MemoryCache};
use crate::config::CacheConfig;
use crate::error::CacheError;

/// One cache layer together with the TTL applied to its writes.
#[derive(Clone)]
pub struct CacheLayer {
    cache: Arc<dyn Cache>,
    memory: Option<Arc<MemoryCache>>,
    ttl: Duration,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("ttl", &self.ttl)
            .field("memory", &self.memory.is_some())
            .finish()
    }
}

impl CacheLayer {
    /// Layer over any [`Cache`] backend.
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            cache,
            memory: None,
            ttl,
        }
    }

    /// Layer backed by a fresh [`MemoryCache`].
    pub fn memory(ttl: Duration) -> Self {
        let memory = Arc::new(MemoryCache::new());
        Self {
            cache: memory.clone(),
            memory: Some(memory),
            ttl,
        }
    }

    /// TTL applied to every write.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Raw bytes stored under `key`, if still live.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.get(key)
    }

    /// Stores raw bytes with the layer TTL.
    pub fn set(&self, key: String, value: Vec<u8>) -> Result<(), CacheError> {
        self.cache.set(key, value, self.ttl)
    }

    /// Deserializes a JSON value stored under `key`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, CacheError>> {
        self.cache
            .get(key)
            .map(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from))
    }

    /// Stores `value` as JSON with the layer TTL.
    pub fn set_json<T: Serialize + ?Sized>(&self, key: String, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes)
    }

    /// Removes the entry under `key`.
    pub fn delete(&self, key: &str) {
        self.cache.delete(key);
    }

    /// Removes every entry in this layer.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Sweeps expired entries when the layer is memory-backed.
    pub fn purge_expired(&self) -> usize {
        self.memory
            .as_ref()
            .map(|memory| memory.purge_expired())
            .unwrap_or(0)
    }
}

/// Short-TTL request-dedup cache plus longer-TTL fetch-result cache.
#[derive(Debug, Clone)]
pub struct TwoLevelCache {
    request: CacheLayer,
    fetch: CacheLayer,
}

impl Default for TwoLevelCache {
    fn default() -> Self {
        Self::from_config(CacheConfig::default())
    }
}

impl TwoLevelCache {
    /// Combines two prepared layers.
    pub fn new(request: CacheLayer, fetch: CacheLayer) -> Self {
        Self { request, fetch }
    }

    /// Both layers backed by their own [`MemoryCache`].
    pub fn memory(request_ttl: Duration, fetch_ttl: Duration) -> Self {
        Self::new(CacheLayer::memory(request_ttl), CacheLayer::memory(fetch_ttl))
    }

    /// Memory-backed layers with the configured TTLs.
    pub fn from_config(config: CacheConfig) -> Self {
        Self::memory(config.request_ttl, config.fetch_ttl)
    }

    /// Layer used by the executor to de-duplicate identical requests.
    pub fn request_layer(&self) -> &CacheLayer {
        &self.request
    }

    /// Layer used by the fetch manager to store whole fetch results.
    pub fn fetch_layer(&self) -> &CacheLayer {
        &self.fetch
    }

    /// Sweeps both layers and returns how many entries were dropped.
    pub fn purge_expired(&self) -> usize {
        self.request.purge_expired() + self.fetch.purge_expired()
    }

    /// Empties both layers.
    pub fn clear(&self) {
        self.request.clear();
        self.fetch.clear();
    }
}
