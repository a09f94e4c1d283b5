//! The batch coordinator facade
//!
//! Owns every component of the pipeline (normalizer, cache, accumulator,
//! dispatcher stack, demultiplexer, promise registry) and wires the flow
//! from caller through cache check, enqueue, flush, dispatch and
//! demultiplexing to settlement. Instances are explicitly constructed with
//! their configuration and dispatcher; there is no shared module-level state.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::accumulator::BatchAccumulator;
use crate::cache::{CacheStats, ResponseCache};
use crate::config::CoordinatorConfig;
use crate::demux::ResponseDemultiplexer;
use crate::dispatch::{self, Dispatcher};
use crate::error::{CoordinatorError, Result};
use crate::normalizer::RequestNormalizer;
use crate::registry::PromiseRegistry;
use crate::stats::{CoordinatorStats, StatsRecorder};
use crate::types::{ApiRequest, BatchResponseEnvelope};
use crate::HttpMethod;

/// Client-side request batch coordinator
pub struct BatchCoordinator {
    config: CoordinatorConfig,
    cache: ResponseCache,
    normalizer: RequestNormalizer,
    registry: PromiseRegistry,
    accumulator: BatchAccumulator,
    demux: ResponseDemultiplexer,
    dispatcher: Arc<dyn Dispatcher>,
    stats: StatsRecorder,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchCoordinator {
    /// Create a coordinator with the production dispatch stack
    pub async fn new(config: CoordinatorConfig) -> Result<Arc<Self>> {
        let stats = StatsRecorder::new();
        let dispatcher = dispatch::build_dispatcher(&config, stats.clone())?;
        Self::assemble(config, dispatcher, stats).await
    }

    /// Create a coordinator around an injected dispatcher
    pub async fn with_dispatcher(
        config: CoordinatorConfig,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Arc<Self>> {
        Self::assemble(config, dispatcher, StatsRecorder::new()).await
    }

    async fn assemble(
        config: CoordinatorConfig,
        dispatcher: Arc<dyn Dispatcher>,
        stats: StatsRecorder,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let coordinator = Arc::new(Self {
            cache: ResponseCache::new(config.cache.max_entries),
            normalizer: RequestNormalizer::new(&config.normalizer),
            registry: PromiseRegistry::new(),
            accumulator: BatchAccumulator::new(
                config.batching.max_batch_size,
                config.batching.batch_delay(),
            ),
            demux: ResponseDemultiplexer::new(),
            dispatcher,
            stats,
            tasks: Mutex::new(Vec::new()),
            config,
        });

        let worker = coordinator.spawn_flush_worker();
        let cache_sweep = coordinator
            .cache
            .start_sweep_task(coordinator.config.cache.sweep_interval());
        let registry_sweep = coordinator.registry.start_sweep_task(
            coordinator.config.requests.registry_sweep_interval(),
            coordinator.config.requests.stale_after(),
        );
        coordinator
            .tasks
            .lock()
            .await
            .extend([worker, cache_sweep, registry_sweep]);

        info!(
            max_batch_size = coordinator.config.batching.max_batch_size,
            batch_delay_ms = coordinator.config.batching.batch_delay_ms,
            cache_enabled = coordinator.config.cache.enabled,
            "Batch coordinator initialized"
        );
        Ok(coordinator)
    }

    /// Submit one logical request and await its outcome.
    ///
    /// Cacheable requests are answered from the cache when possible;
    /// everything else is enqueued for the next batch.
    pub async fn submit(&self, request: ApiRequest) -> Result<Value> {
        if request.endpoint.is_empty() {
            return Err(CoordinatorError::invalid_request("endpoint must not be empty"));
        }
        self.stats.record_request().await;

        if self.config.cache.enabled && request.method.is_cacheable() {
            let key = self.normalizer.cache_key(&request);
            if let Some(value) = self.cache.get(&key).await {
                self.stats.record_cache_hit().await;
                debug!(
                    id = request.id.as_str(),
                    key = key.as_str(),
                    "Request served from cache"
                );
                return Ok(value);
            }
            self.stats.record_cache_miss().await;
        }

        let id = request.id.clone();
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.config.requests.default_timeout());
        let rx = self.registry.register(&id).await;
        self.accumulator.enqueue(request).await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CoordinatorError::cancelled(id)),
            Err(_) => {
                // Only this caller gives up; the slot in the in-flight batch
                // runs to completion so shared bookkeeping stays intact.
                self.stats.record_error().await;
                warn!(
                    id = id.as_str(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out waiting for its batch"
                );
                Err(CoordinatorError::timeout(id))
            }
        }
    }

    /// Submit several requests and await all results in order
    pub async fn execute_batch(&self, requests: Vec<ApiRequest>) -> Result<Vec<Value>> {
        let futures: Vec<_> = requests.into_iter().map(|r| self.submit(r)).collect();
        futures::future::join_all(futures).await.into_iter().collect()
    }

    /// Submit a map of named requests and await a map of named results
    pub async fn execute_named_batch(
        &self,
        requests: HashMap<String, ApiRequest>,
    ) -> Result<HashMap<String, Value>> {
        let mut names = Vec::with_capacity(requests.len());
        let mut futures = Vec::with_capacity(requests.len());
        for (name, request) in requests {
            names.push(name);
            futures.push(self.submit(request));
        }

        names
            .into_iter()
            .zip(futures::future::join_all(futures).await)
            .map(|(name, outcome)| outcome.map(|value| (name, value)))
            .collect()
    }

    /// Force immediate dispatch of everything pending, bypassing the timer
    pub async fn flush_pending(&self) {
        let snapshot = self.accumulator.drain().await;
        if snapshot.is_empty() {
            return;
        }
        debug!(count = snapshot.len(), "Flushing pending requests");
        for chunk in snapshot.chunks(self.config.batching.max_batch_size) {
            self.dispatch_batch(chunk).await;
        }
    }

    /// Clear the queue and reject every outstanding promise immediately.
    /// Requests already on the network run to completion; their responses
    /// are dropped on arrival.
    pub async fn cancel_all_pending(&self) -> usize {
        let dropped = self.accumulator.drain().await.len();
        let rejected = self
            .registry
            .reject_all(|id| CoordinatorError::cancelled(id.to_string()))
            .await;
        info!(
            dropped_from_queue = dropped,
            rejected = rejected,
            "Cancelled all pending requests"
        );
        rejected
    }

    /// Invalidate the cache entry a request would be served from
    pub async fn invalidate_cache(&self, request: &ApiRequest) -> bool {
        self.cache
            .invalidate(&self.normalizer.cache_key(request))
            .await
    }

    /// Invalidate all cached entries under an endpoint prefix
    pub async fn invalidate_endpoint(&self, prefix: &str) -> usize {
        // Immutable endpoints are keyed by bare path; everything else that
        // lands in the cache is a GET.
        let mut removed = self.cache.invalidate_prefix(prefix).await;
        removed += self
            .cache
            .invalidate_prefix(&format!("{} {}", HttpMethod::Get, prefix))
            .await;
        removed
    }

    /// Drop every cached entry
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Snapshot of the coordinator counters
    pub async fn statistics(&self) -> CoordinatorStats {
        self.stats.snapshot().await
    }

    /// Snapshot of the cache counters
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Reset all counters
    pub async fn reset_statistics(&self) {
        self.stats.reset().await;
        self.cache.reset_stats().await;
    }

    /// Flush remaining work, stop background tasks and reject leftovers
    pub async fn shutdown(&self) {
        info!("Coordinator shutting down");
        self.flush_pending().await;

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        let leftover = self
            .registry
            .reject_all(|id| CoordinatorError::cancelled(id.to_string()))
            .await;
        if leftover > 0 {
            warn!(leftover = leftover, "Rejected unsettled promises at shutdown");
        }
    }

    fn spawn_flush_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                coordinator.accumulator.next_window().await;
                let snapshot = coordinator.accumulator.drain().await;
                if snapshot.is_empty() {
                    continue;
                }
                for chunk in snapshot.chunks(coordinator.config.batching.max_batch_size) {
                    coordinator.dispatch_batch(chunk).await;
                }
            }
        })
    }

    /// Dispatch one bounded batch and settle every caller in it
    async fn dispatch_batch(&self, batch: &[ApiRequest]) {
        if batch.is_empty() {
            return;
        }
        self.stats.record_batch(batch.len()).await;

        match self.dispatcher.dispatch(batch).await {
            Ok(raw) => self.settle_batch(&raw, batch).await,
            Err(error) => {
                self.stats.record_error().await;
                error!(
                    batch_size = batch.len(),
                    category = error.category(),
                    error = %error,
                    "Batch failed, rejecting all callers"
                );
                let message = error.to_string();
                for request in batch {
                    self.registry
                        .reject(
                            &request.id,
                            CoordinatorError::batch_failed(request.id.clone(), message.clone()),
                        )
                        .await;
                }
            }
        }
    }

    async fn settle_batch(&self, raw: &Value, batch: &[ApiRequest]) {
        match self.demux.demux(raw, batch) {
            Ok(envelopes) => {
                let by_id: HashMap<&str, &ApiRequest> =
                    batch.iter().map(|r| (r.id.as_str(), r)).collect();

                let mut settled: HashSet<String> = HashSet::with_capacity(envelopes.len());
                for envelope in envelopes {
                    if let Some(request) = by_id.get(envelope.id.as_str()) {
                        settled.insert(envelope.id.clone());
                        self.settle_one(request, envelope).await;
                    }
                }

                for request in batch {
                    if !settled.contains(&request.id) {
                        self.stats.record_error().await;
                        warn!(id = request.id.as_str(), "No response received for request");
                        self.registry
                            .reject(&request.id, CoordinatorError::no_response(request.id.clone()))
                            .await;
                    }
                }
            }
            Err(error) => {
                // No envelopes could be extracted: total batch failure
                self.stats.record_error().await;
                error!(
                    batch_size = batch.len(),
                    category = error.category(),
                    error = %error,
                    "Unable to demultiplex batch response"
                );
                let message = error.to_string();
                for request in batch {
                    self.registry
                        .reject(
                            &request.id,
                            CoordinatorError::batch_failed(request.id.clone(), message.clone()),
                        )
                        .await;
                }
            }
        }
    }

    async fn settle_one(&self, request: &ApiRequest, envelope: BatchResponseEnvelope) {
        if envelope.is_success() {
            let data = envelope.data.unwrap_or(Value::Null);
            if self.config.cache.enabled && request.method.is_cacheable() {
                let key = self.normalizer.cache_key(request);
                let ttl = self
                    .normalizer
                    .effective_ttl(request, self.config.cache.default_ttl());
                self.cache.insert(key, data.clone(), ttl).await;
            }
            self.registry.resolve(&request.id, data).await;
            return;
        }

        self.stats.record_error().await;
        if request.critical {
            error!(
                id = request.id.as_str(),
                status = envelope.status,
                "Critical request failed in batch"
            );
        }

        if request.ignore_errors {
            debug!(
                id = request.id.as_str(),
                status = envelope.status,
                "Ignoring failure per request policy"
            );
            self.registry
                .resolve(&request.id, envelope.data.unwrap_or(Value::Null))
                .await;
        } else {
            self.registry
                .reject(
                    &request.id,
                    CoordinatorError::Status {
                        id: request.id.clone(),
                        status: envelope.status,
                        message: envelope
                            .error
                            .unwrap_or_else(|| "request failed".to_string()),
                    },
                )
                .await;
        }
    }
}
