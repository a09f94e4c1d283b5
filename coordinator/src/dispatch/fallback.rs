//! Transport failover decorator

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::stats::StatsRecorder;
use crate::types::ApiRequest;

/// Falls back to a secondary transport when the primary batch transport
/// fails, including after its retry budget is spent.
pub struct FallbackDispatcher {
    primary: Arc<dyn Dispatcher>,
    fallback: Arc<dyn Dispatcher>,
    stats: StatsRecorder,
}

impl FallbackDispatcher {
    /// Create a new fallback decorator
    pub fn new(
        primary: Arc<dyn Dispatcher>,
        fallback: Arc<dyn Dispatcher>,
        stats: StatsRecorder,
    ) -> Self {
        Self {
            primary,
            fallback,
            stats,
        }
    }
}

#[async_trait]
impl Dispatcher for FallbackDispatcher {
    async fn dispatch(&self, batch: &[ApiRequest]) -> Result<Value> {
        match self.primary.dispatch(batch).await {
            Ok(raw) => Ok(raw),
            Err(error) if error.is_transport_failure() => {
                self.stats.record_fallback().await;
                warn!(
                    batch_size = batch.len(),
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %error,
                    "Batch transport unavailable, using fallback"
                );
                self.fallback.dispatch(batch).await
            }
            Err(error) => Err(error),
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct DownDispatcher;

    #[async_trait]
    impl Dispatcher for DownDispatcher {
        async fn dispatch(&self, _batch: &[ApiRequest]) -> Result<Value> {
            Err(CoordinatorError::retries_exhausted(3, "unreachable"))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    struct CountingDispatcher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Dispatcher for CountingDispatcher {
        async fn dispatch(&self, _batch: &[ApiRequest]) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!([]))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_engages_on_transport_failure() {
        let secondary = Arc::new(CountingDispatcher {
            calls: AtomicU32::new(0),
        });
        let stats = StatsRecorder::new();
        let dispatcher =
            FallbackDispatcher::new(Arc::new(DownDispatcher), secondary.clone(), stats.clone());

        let batch = vec![ApiRequest::get("/api/test")];
        assert!(dispatcher.dispatch(&batch).await.is_ok());
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.snapshot().await.fallback_count, 1);
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Arc::new(CountingDispatcher {
            calls: AtomicU32::new(0),
        });
        let secondary = Arc::new(CountingDispatcher {
            calls: AtomicU32::new(0),
        });
        let dispatcher =
            FallbackDispatcher::new(primary, secondary.clone(), StatsRecorder::new());

        let batch = vec![ApiRequest::get("/api/test")];
        assert!(dispatcher.dispatch(&batch).await.is_ok());
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }
}
