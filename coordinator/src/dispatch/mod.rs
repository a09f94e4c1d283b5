//! Batch dispatch
//!
//! The dispatcher sends an accumulated batch as one transport call and
//! returns the raw response; interpreting its shape is the demultiplexer's
//! job. Cross-cutting behavior (logging, retry, single-request fallback) is
//! layered on as decorator objects assembled once at construction, never by
//! mutating a live dispatcher.

pub mod fallback;
pub mod http;
pub mod logging;
pub mod retry;
pub mod single;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::stats::StatsRecorder;
use crate::types::ApiRequest;

pub use fallback::FallbackDispatcher;
pub use http::HttpBatchDispatcher;
pub use logging::LoggingDispatcher;
pub use retry::RetryDispatcher;
pub use single::SingleFlightDispatcher;

/// Sends a batch of requests as one outbound call
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Dispatch the batch and return the raw, shape-agnostic response
    async fn dispatch(&self, batch: &[ApiRequest]) -> Result<Value>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Assemble the production dispatch stack from configuration:
/// logging around fallback around (optionally) retry around the batch
/// transport, with the single-request path as the fallback.
pub fn build_dispatcher(
    config: &CoordinatorConfig,
    stats: StatsRecorder,
) -> Result<Arc<dyn Dispatcher>> {
    let client = reqwest::Client::builder()
        .timeout(config.requests.default_timeout())
        .build()?;

    let batch: Arc<dyn Dispatcher> =
        Arc::new(HttpBatchDispatcher::new(client.clone(), &config.endpoint)?);

    let primary: Arc<dyn Dispatcher> = if config.retry.enabled {
        Arc::new(RetryDispatcher::new(batch, &config.retry, stats.clone()))
    } else {
        batch
    };

    let single: Arc<dyn Dispatcher> =
        Arc::new(SingleFlightDispatcher::new(client, &config.endpoint)?);
    let with_fallback: Arc<dyn Dispatcher> =
        Arc::new(FallbackDispatcher::new(primary, single, stats));

    Ok(Arc::new(LoggingDispatcher::new(with_fallback)))
}
