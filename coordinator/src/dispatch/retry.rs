//! Whole-batch retry decorator

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{BackoffMode, RetryConfig};
use crate::dispatch::Dispatcher;
use crate::error::{CoordinatorError, Result};
use crate::stats::StatsRecorder;
use crate::types::ApiRequest;

/// Retries the entire batch on transport-level failure.
///
/// Per-item failures travel inside a successful response and are never
/// retried here.
pub struct RetryDispatcher {
    inner: Arc<dyn Dispatcher>,
    max_retries: u32,
    retry_delay: Duration,
    backoff: BackoffMode,
    stats: StatsRecorder,
}

impl RetryDispatcher {
    /// Create a new retry decorator
    pub fn new(inner: Arc<dyn Dispatcher>, config: &RetryConfig, stats: StatsRecorder) -> Self {
        Self {
            inner,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            backoff: config.backoff,
            stats,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffMode::Fixed => self.retry_delay,
            BackoffMode::Incrementing => self.retry_delay * attempt,
        }
    }
}

#[async_trait]
impl Dispatcher for RetryDispatcher {
    async fn dispatch(&self, batch: &[ApiRequest]) -> Result<Value> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.inner.dispatch(batch).await {
                Ok(raw) => return Ok(raw),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) if attempt > self.max_retries => {
                    return Err(CoordinatorError::retries_exhausted(
                        attempt,
                        error.to_string(),
                    ));
                }
                Err(error) => {
                    self.stats.record_retry().await;
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt,
                        batch_size = batch.len(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Batch dispatch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiRequest;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyDispatcher {
        calls: AtomicU32,
        succeed_after: u32,
    }

    #[async_trait]
    impl Dispatcher for FlakyDispatcher {
        async fn dispatch(&self, _batch: &[ApiRequest]) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call > self.succeed_after {
                Ok(Value::Array(vec![]))
            } else {
                Err(CoordinatorError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )))
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_retries,
            retry_delay_ms: 1,
            backoff: BackoffMode::Fixed,
        }
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let flaky = Arc::new(FlakyDispatcher {
            calls: AtomicU32::new(0),
            succeed_after: 2,
        });
        let retry = RetryDispatcher::new(flaky.clone(), &config(3), StatsRecorder::new());

        let batch = vec![ApiRequest::get("/api/test")];
        assert!(retry.dispatch(&batch).await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_retries_plus_one() {
        let flaky = Arc::new(FlakyDispatcher {
            calls: AtomicU32::new(0),
            succeed_after: u32::MAX,
        });
        let retry = RetryDispatcher::new(flaky.clone(), &config(2), StatsRecorder::new());

        let batch = vec![ApiRequest::get("/api/test")];
        let error = retry.dispatch(&batch).await.unwrap_err();
        assert!(matches!(
            error,
            CoordinatorError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transport_errors_not_retried() {
        struct RejectingDispatcher;

        #[async_trait]
        impl Dispatcher for RejectingDispatcher {
            async fn dispatch(&self, _batch: &[ApiRequest]) -> Result<Value> {
                Err(CoordinatorError::invalid_request("bad batch"))
            }

            fn name(&self) -> &'static str {
                "rejecting"
            }
        }

        let retry = RetryDispatcher::new(
            Arc::new(RejectingDispatcher),
            &config(5),
            StatsRecorder::new(),
        );
        let batch = vec![ApiRequest::get("/api/test")];
        assert!(matches!(
            retry.dispatch(&batch).await.unwrap_err(),
            CoordinatorError::InvalidRequest(_)
        ));
    }
}
