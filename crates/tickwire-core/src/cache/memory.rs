//! In-memory TTL cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::Cache;
use crate::error::CacheError;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe in-memory cache with per-entry TTL.
///
/// Expired entries read as misses but stay in the map until
/// [`MemoryCache::purge_expired`] or [`Cache::clear`] runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    map: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        before - map.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.map.read();
        map.get(key).and_then(|entry| {
            if entry.is_expired(Instant::now()) {
                None
            } else {
                Some(entry.value.clone())
            }
        })
    }

    fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60));
        self.map.write().insert(key, CacheEntry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) {
        self.map.write().remove(key);
    }

    fn clear(&self) {
        self.map.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic_operations() {
        let cache = MemoryCache::new();

        // Cache miss
        assert!(cache.get("key1").is_none());

        // Set and get
        cache
            .set("key1".to_string(), b"value1".to_vec(), Duration::from_secs(1))
            .expect("memory set never fails");
        assert_eq!(cache.get("key1"), Some(b"value1".to_vec()));

        // Overwrite
        cache
            .set("key1".to_string(), b"value2".to_vec(), Duration::from_secs(1))
            .expect("memory set never fails");
        assert_eq!(cache.get("key1"), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_cache_expiration_is_lazy() {
        let cache = MemoryCache::new();

        cache
            .set("key1".to_string(), b"value1".to_vec(), Duration::from_millis(10))
            .expect("memory set never fails");
        assert!(cache.get("key1").is_some());

        std::thread::sleep(Duration::from_millis(30));

        // Expired reads miss, but the entry is still stored
        assert!(cache.get("key1").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_purge_expired() {
        let cache = MemoryCache::new();

        cache
            .set("short".to_string(), b"a".to_vec(), Duration::from_millis(10))
            .expect("memory set never fails");
        cache
            .set("long".to_string(), b"b".to_vec(), Duration::from_secs(60))
            .expect("memory set never fails");

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(b"b".to_vec()));
    }

    #[test]
    fn test_cache_delete_then_get_misses() {
        let cache = MemoryCache::new();

        cache
            .set("key1".to_string(), b"value1".to_vec(), Duration::from_secs(60))
            .expect("memory set never fails");
        cache.delete("key1");

        assert!(cache.get("key1").is_none());
        cache.delete("missing");
    }

    #[test]
    fn test_cache_clear_all() {
        let cache = MemoryCache::new();

        cache
            .set("key1".to_string(), b"value1".to_vec(), Duration::from_secs(60))
            .expect("memory set never fails");
        cache
            .set("key2".to_string(), b"value2".to_vec(), Duration::from_secs(60))
            .expect("memory set never fails");

        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("key1").is_none());
    }

    #[test]
    fn test_cache_huge_ttl_does_not_overflow() {
        let cache = MemoryCache::new();

        cache
            .set("key1".to_string(), b"v".to_vec(), Duration::MAX)
            .expect("memory set never fails");
        assert!(cache.get("key1").is_some());
    }
}
