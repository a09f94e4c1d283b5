//! Dispatch logging decorator

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::types::ApiRequest;

/// Logs timing and outcome around every dispatch
pub struct LoggingDispatcher {
    inner: Arc<dyn Dispatcher>,
}

impl LoggingDispatcher {
    /// Create a new logging decorator
    pub fn new(inner: Arc<dyn Dispatcher>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Dispatcher for LoggingDispatcher {
    async fn dispatch(&self, batch: &[ApiRequest]) -> Result<Value> {
        debug!(
            batch_size = batch.len(),
            dispatcher = self.inner.name(),
            "Dispatching batch"
        );
        let start = Instant::now();

        let outcome = self.inner.dispatch(batch).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => debug!(
                batch_size = batch.len(),
                elapsed_ms = elapsed_ms,
                "Batch dispatched"
            ),
            Err(error) => warn!(
                batch_size = batch.len(),
                elapsed_ms = elapsed_ms,
                category = error.category(),
                error = %error,
                "Batch dispatch failed"
            ),
        }

        outcome
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
