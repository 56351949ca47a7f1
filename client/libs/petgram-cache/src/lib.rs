//! Petgram local query cache
//!
//! Holds derived view state (feeds, search results, profile pages) keyed by
//! the versioned schema in [`CacheKey`]:
//! - Values stored as JSON so any serde type round-trips
//! - In-place patching for optimistic updates
//! - Prefix invalidation (e.g. every cached feed after a like settles)
//! - Hit/miss/write counters

mod error;
mod keys;
mod stats;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use stats::{CacheStats, CacheStatsSnapshot};

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Concurrent key/value cache shared by the client components.
///
/// Cloning is cheap and clones share storage.
#[derive(Clone, Default)]
pub struct QueryCache {
    store: Arc<DashMap<String, Value>>,
    stats: CacheStats,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(value) = self.store.get(key).map(|v| v.value().clone()) else {
            debug!(key = %key, "Cache miss");
            self.stats.record_miss();
            return Ok(None);
        };

        match serde_json::from_value::<T>(value) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                self.stats.record_hit();
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache deserialization failed");
                self.stats.record_error();
                // Drop the entry so the next read refetches
                self.store.remove(key);
                Ok(None)
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.store.insert(key.to_string(), value);
        debug!(key = %key, "Cache set");
        self.stats.record_write();
        Ok(())
    }

    /// Patch a cached value in place. Returns `false` when the key is absent.
    ///
    /// The entry stays locked for the duration of `f`.
    pub fn modify<T, F>(&self, key: &str, f: F) -> CacheResult<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let Some(mut entry) = self.store.get_mut(key) else {
            return Ok(false);
        };
        let mut value: T = serde_json::from_value(entry.value().clone())?;
        f(&mut value);
        *entry.value_mut() = serde_json::to_value(&value)?;
        self.stats.record_write();
        Ok(true)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn del(&self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            debug!(key = %key, "Cache delete");
            self.stats.record_invalidations(1);
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.store.len();
        self.store.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.store.len());
        debug!(prefix = %prefix, removed, "Cache prefix invalidation");
        self.stats.record_invalidations(removed as u64);
        removed
    }

    pub fn clear(&self) {
        let removed = self.store.len();
        self.store.clear();
        self.stats.record_invalidations(removed as u64);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        likes: u32,
        liked: bool,
    }

    #[test]
    fn test_set_get_roundtrip_and_stats() {
        let cache = QueryCache::new();
        assert_eq!(cache.get::<Counter>("v1:post:a").unwrap(), None);

        let value = Counter {
            likes: 2,
            liked: false,
        };
        cache.set("v1:post:a", &value).unwrap();
        assert_eq!(cache.get::<Counter>("v1:post:a").unwrap(), Some(value));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[test]
    fn test_modify_patches_in_place() {
        let cache = QueryCache::new();
        cache
            .set(
                "k",
                &Counter {
                    likes: 1,
                    liked: false,
                },
            )
            .unwrap();

        let patched = cache
            .modify::<Counter, _>("k", |c| {
                c.likes += 1;
                c.liked = true;
            })
            .unwrap();
        assert!(patched);
        assert_eq!(
            cache.get::<Counter>("k").unwrap(),
            Some(Counter {
                likes: 2,
                liked: true
            })
        );
        assert!(!cache.modify::<Counter, _>("missing", |_| {}).unwrap());
    }

    #[test]
    fn test_corrupt_entry_is_dropped() {
        let cache = QueryCache::new();
        cache.set("k", &"not a counter").unwrap();
        assert_eq!(cache.get::<Counter>("k").unwrap(), None);
        assert!(!cache.contains("k"));
        assert_eq!(cache.stats().errors, 1);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = QueryCache::new();
        cache.set("v1:feed:a", &1).unwrap();
        cache.set("v1:feed:b", &2).unwrap();
        cache.set("v1:profile:luna", &3).unwrap();

        assert_eq!(cache.invalidate_prefix("v1:feed:"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("v1:profile:luna"));
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let cache = QueryCache::new();
        let writer = cache.clone();
        tokio::spawn(async move { writer.set("k", &7u32) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cache.get::<u32>("k").unwrap(), Some(7));
    }
}
