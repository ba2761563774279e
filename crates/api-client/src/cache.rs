//! Response cache over the key-value store
//!
//! Entries live under `cache_<key>` as `{"data": ..., "expiry": <ms>}`. An
//! entry past its expiry is never returned; it is removed when read or swept.
//! Storage failures are logged and read as misses.

use caltracker_core::clock::{Clock, duration_millis};
use caltracker_core::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Store key prefix for cached responses
pub const CACHE_PREFIX: &str = "cache_";

/// Persisted cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached response payload
    pub data: Value,
    /// Epoch milliseconds after which the entry is stale; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl CacheEntry {
    /// Whether the entry is stale at `now`
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry.is_some_and(|expiry| now > expiry)
    }
}

/// TTL cache of JSON responses
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Create a cache over `store`
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn storage_key(key: &str) -> String {
        format!("{CACHE_PREFIX}{key}")
    }

    /// Read a live entry
    pub async fn read(&self, key: &str) -> Option<Value> {
        let storage_key = Self::storage_key(key);
        let raw = match self.store.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.remove(key).await;
                return None;
            }
        };

        if entry.is_expired(self.clock.now_millis()) {
            debug!(key = %key, "Cache entry expired");
            self.remove(key).await;
            return None;
        }

        Some(entry.data)
    }

    /// Store `data`; a `None` or zero `ttl` never expires
    pub async fn write(&self, key: &str, data: &Value, ttl: Option<Duration>) {
        let expiry = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| self.clock.now_millis().saturating_add(duration_millis(ttl)));
        let entry = CacheEntry {
            data: data.clone(),
            expiry,
        };

        let result = match serde_json::to_string(&entry) {
            Ok(raw) => self.store.set(&Self::storage_key(key), &raw).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => debug!(key = %key, expiry = ?expiry, "Cached response"),
            Err(e) => warn!(key = %key, error = %e, "Cache write failed"),
        }
    }

    /// Delete one entry
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(&Self::storage_key(key)).await {
            warn!(key = %key, error = %e, "Cache remove failed");
        }
    }

    /// Delete every expired or unreadable entry, returning how many went
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;

        for storage_key in self.cache_keys().await {
            let stale = match self.store.get(&storage_key).await {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry>(&raw)
                    .map_or(true, |entry| entry.is_expired(now)),
                Ok(None) => false,
                Err(e) => {
                    warn!(key = %storage_key, error = %e, "Skipping cache entry during sweep");
                    false
                }
            };

            if stale {
                match self.store.remove(&storage_key).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(key = %storage_key, error = %e, "Cache remove failed"),
                }
            }
        }

        if removed > 0 {
            debug!(removed = removed, "Swept expired cache entries");
        }
        removed
    }

    /// Delete every cache entry, returning how many went
    pub async fn clear(&self) -> usize {
        let mut removed = 0;
        for storage_key in self.cache_keys().await {
            match self.store.remove(&storage_key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %storage_key, error = %e, "Cache remove failed"),
            }
        }
        removed
    }

    async fn cache_keys(&self) -> Vec<String> {
        match self.store.keys().await {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| key.starts_with(CACHE_PREFIX))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Listing cache keys failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caltracker_core::clock::ManualClock;
    use caltracker_core::storage::MemoryStore;
    use serde_json::json;

    fn cache_with_clock() -> (ResponseCache, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(1_000_000);
        let cache = ResponseCache::new(store.clone(), Arc::new(clock.clone()));
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (cache, store, clock) = cache_with_clock();
        cache
            .write("food_search_egg", &json!(["egg"]), Some(Duration::from_millis(5000)))
            .await;

        clock.advance(Duration::from_millis(5000));
        assert_eq!(cache.read("food_search_egg").await, Some(json!(["egg"])));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.read("food_search_egg").await, None);
        assert!(!store.exists("cache_food_search_egg").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_without_ttl_persists() {
        let (cache, _store, clock) = cache_with_clock();
        cache.write("insights_u1", &json!({"a": 1}), None).await;
        cache.write("insights_u2", &json!({"b": 2}), Some(Duration::ZERO)).await;

        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(cache.read("insights_u1").await, Some(json!({"a": 1})));
        assert_eq!(cache.read("insights_u2").await, Some(json!({"b": 2})));
    }

    #[tokio::test]
    async fn test_stored_layout() {
        let (cache, store, _clock) = cache_with_clock();
        cache
            .write("food_details_f1", &json!({"id": "f1"}), Some(Duration::from_secs(1)))
            .await;

        let raw = store.get("cache_food_details_f1").await.unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, json!({"data": {"id": "f1"}, "expiry": 1_001_000}));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_cache_entries() {
        let (cache, store, clock) = cache_with_clock();
        cache.write("short", &json!(1), Some(Duration::from_secs(1))).await;
        cache.write("long", &json!(2), Some(Duration::from_secs(60))).await;
        cache.write("forever", &json!(3), None).await;
        store.set("cache_garbage", "not json").await.unwrap();
        store.set("offline_queue_food", "[]").await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.sweep_expired().await, 2);

        assert!(!store.exists("cache_short").await.unwrap());
        assert!(!store.exists("cache_garbage").await.unwrap());
        assert!(store.exists("cache_long").await.unwrap());
        assert!(store.exists("cache_forever").await.unwrap());
        assert!(store.exists("offline_queue_food").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_keeps_other_prefixes() {
        let (cache, store, _clock) = cache_with_clock();
        cache.write("a", &json!(1), None).await;
        cache.write("b", &json!(2), None).await;
        store.set("last_sync_timestamp", "1").await.unwrap();

        assert_eq!(cache.clear().await, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (cache, store, _clock) = cache_with_clock();
        store.set("cache_broken", "{").await.unwrap();
        assert_eq!(cache.read("broken").await, None);
        assert!(!store.exists("cache_broken").await.unwrap());
    }
}
