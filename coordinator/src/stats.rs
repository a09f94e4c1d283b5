//! Coordinator statistics
//!
//! Informational counters only; nothing here participates in correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot of coordinator counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Logical requests submitted
    pub total_requests: u64,

    /// Requests that went out as part of a batch
    pub batched_requests: u64,

    /// Requests served from cache
    pub cache_hits: u64,

    /// Cacheable requests that missed
    pub cache_misses: u64,

    /// Batches dispatched
    pub batch_count: u64,

    /// Smallest batch dispatched (0 until the first batch)
    pub min_batch_size: usize,

    /// Largest batch dispatched
    pub max_batch_size: usize,

    /// Average batch size
    pub avg_batch_size: f64,

    /// Failed requests and batches
    pub error_count: u64,

    /// Batch retry attempts performed
    pub retry_count: u64,

    /// Times the single-request fallback path engaged
    pub fallback_count: u64,

    /// Snapshot timestamp
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    batched_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    batch_count: u64,
    min_batch_size: usize,
    max_batch_size: usize,
    error_count: u64,
    retry_count: u64,
    fallback_count: u64,
}

/// Shared recorder behind the coordinator and the dispatch decorators
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    inner: Arc<RwLock<StatsInner>>,
}

impl StatsRecorder {
    /// Create a fresh recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted logical request
    pub async fn record_request(&self) {
        self.inner.write().await.total_requests += 1;
    }

    /// Record a cache hit
    pub async fn record_cache_hit(&self) {
        self.inner.write().await.cache_hits += 1;
    }

    /// Record a cache miss
    pub async fn record_cache_miss(&self) {
        self.inner.write().await.cache_misses += 1;
    }

    /// Record a dispatched batch of the given size
    pub async fn record_batch(&self, size: usize) {
        let mut inner = self.inner.write().await;
        inner.batched_requests += size as u64;
        if inner.batch_count == 0 {
            inner.min_batch_size = size;
            inner.max_batch_size = size;
        } else {
            inner.min_batch_size = inner.min_batch_size.min(size);
            inner.max_batch_size = inner.max_batch_size.max(size);
        }
        inner.batch_count += 1;
    }

    /// Record a failed request or batch
    pub async fn record_error(&self) {
        self.inner.write().await.error_count += 1;
    }

    /// Record a batch retry attempt
    pub async fn record_retry(&self) {
        self.inner.write().await.retry_count += 1;
    }

    /// Record a fallback to the single-request path
    pub async fn record_fallback(&self) {
        self.inner.write().await.fallback_count += 1;
    }

    /// Take a snapshot of the counters
    pub async fn snapshot(&self) -> CoordinatorStats {
        let inner = self.inner.read().await;
        CoordinatorStats {
            total_requests: inner.total_requests,
            batched_requests: inner.batched_requests,
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            batch_count: inner.batch_count,
            min_batch_size: inner.min_batch_size,
            max_batch_size: inner.max_batch_size,
            avg_batch_size: if inner.batch_count > 0 {
                inner.batched_requests as f64 / inner.batch_count as f64
            } else {
                0.0
            },
            error_count: inner.error_count,
            retry_count: inner.retry_count,
            fallback_count: inner.fallback_count,
            generated_at: Utc::now(),
        }
    }

    /// Reset all counters
    pub async fn reset(&self) {
        *self.inner.write().await = StatsInner::default();
    }
}
