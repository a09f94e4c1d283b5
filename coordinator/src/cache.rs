//! Time-boxed response cache
//!
//! Stores successful GET payloads under normalized request keys. Entries are
//! checked lazily on read and swept periodically in the background so that
//! values never outlive their TTL.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached payload
    data: Value,

    /// Timestamp when cached
    cached_at: Instant,

    /// Time-to-live
    ttl: Duration,
}

impl CacheEntry {
    fn new(data: Value, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if entry has outlived its TTL
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache counters and size snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Cache hits
    pub hits: u64,

    /// Cache misses
    pub misses: u64,

    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,

    /// Current number of entries
    pub entries: usize,

    /// Entries removed by sweeps and lazy expiry
    pub expired: u64,

    /// Entries evicted to respect the capacity bound
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: u64,
    misses: u64,
    expired: u64,
    evicted: u64,
}

/// TTL cache for successful response payloads
#[derive(Debug)]
pub struct ResponseCache {
    /// Cache storage; entries are inserted and removed as whole units
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,

    /// Maximum number of entries
    max_entries: usize,

    /// Cache counters
    counters: Arc<RwLock<CacheCounters>>,
}

impl ResponseCache {
    /// Create a new response cache
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries,
            counters: Arc::new(RwLock::new(CacheCounters::default())),
        }
    }

    /// Get a value, treating expired entries as absent and removing them
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.remove(key);
                let mut counters = self.counters.write().await;
                counters.expired += 1;
                counters.misses += 1;
                debug!(key = key, "Cache entry expired on read");
                return None;
            }
            let data = entry.data.clone();
            self.counters.write().await.hits += 1;
            debug!(key = key, "Cache hit");
            return Some(data);
        }

        self.counters.write().await.misses += 1;
        debug!(key = key, "Cache miss");
        None
    }

    /// Store a value with the given TTL
    pub async fn insert(&self, key: String, data: Value, ttl: Duration) {
        let mut entries = self.entries.write().await;

        // Evict the oldest entry when at capacity
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.cached_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                self.counters.write().await.evicted += 1;
                debug!(key = oldest, "Evicted oldest entry at capacity");
            }
        }

        entries.insert(key.clone(), CacheEntry::new(data, ttl));
        debug!(key = key, ttl_ms = ttl.as_millis() as u64, "Cached value");
    }

    /// Invalidate a specific key
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            debug!(key = key, "Cache entry invalidated");
        }
        removed
    }

    /// Invalidate every key starting with the given prefix
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(prefix = prefix, removed = removed, "Invalidated by prefix");
        }
        removed
    }

    /// Clear all entries
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        info!(entries_cleared = count, "Cache cleared");
    }

    /// Remove all entries whose age exceeds their TTL
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let swept = before - entries.len();
        drop(entries);

        if swept > 0 {
            self.counters.write().await.expired += swept as u64;
            debug!(swept = swept, "Swept expired cache entries");
        }
        swept
    }

    /// Number of live entries, including any not yet swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let counters = self.counters.read().await;
        let total = counters.hits + counters.misses;
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate: if total > 0 {
                counters.hits as f64 / total as f64
            } else {
                0.0
            },
            entries: self.entries.read().await.len(),
            expired: counters.expired,
            evicted: counters.evicted,
        }
    }

    /// Reset hit/miss counters
    pub async fn reset_stats(&self) {
        *self.counters.write().await = CacheCounters::default();
    }

    /// Start the background sweep task
    pub fn start_sweep_task(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);

            loop {
                timer.tick().await;
                let swept = cache.sweep().await;
                if swept > 0 {
                    debug!(swept = swept, "Background cache sweep completed");
                }
            }
        })
    }
}

impl Clone for ResponseCache {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            max_entries: self.max_entries,
            counters: Arc::clone(&self.counters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cache_basic() {
        let cache = ResponseCache::new(16);

        cache
            .insert("k1".to_string(), json!({"a": 1}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k1").await, Some(json!({"a": 1})));
        assert_eq!(cache.get("missing").await, None);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_expiry_on_read() {
        let cache = ResponseCache::new(16);

        cache
            .insert("k1".to_string(), json!(1), Duration::from_millis(50))
            .await;
        assert!(cache.get("k1").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("k1").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let cache = ResponseCache::new(16);

        cache
            .insert("short".to_string(), json!(1), Duration::from_millis(30))
            .await;
        cache
            .insert("long".to_string(), json!(2), Duration::from_secs(60))
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        let swept = cache.sweep().await;
        assert_eq!(swept, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("long").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = ResponseCache::new(16);

        cache
            .insert(
                "GET /api/sessions?page=1".to_string(),
                json!(1),
                Duration::from_secs(60),
            )
            .await;
        cache
            .insert(
                "GET /api/sessions?page=2".to_string(),
                json!(2),
                Duration::from_secs(60),
            )
            .await;
        cache
            .insert(
                "GET /api/users".to_string(),
                json!(3),
                Duration::from_secs(60),
            )
            .await;

        let removed = cache.invalidate_prefix("GET /api/sessions").await;
        assert_eq!(removed, 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = ResponseCache::new(2);

        cache
            .insert("k1".to_string(), json!(1), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache
            .insert("k2".to_string(), json!(2), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache
            .insert("k3".to_string(), json!(3), Duration::from_secs(60))
            .await;

        assert_eq!(cache.len().await, 2);
        // k1 was the oldest
        assert!(cache.get("k1").await.is_none());
        assert!(cache.get("k3").await.is_some());
    }
}
