//! Batch accumulation
//!
//! Collects pending requests and decides when a batch is due: the first
//! enqueue after idle opens a flush window, and reaching the maximum batch
//! size closes it early (debounce with a ceiling). The flush worker drains a
//! copy-then-clear snapshot, so requests arriving during an in-flight
//! dispatch wait for the next batch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::types::ApiRequest;

/// Accumulates requests into dispatch-ready batches
#[derive(Debug)]
pub struct BatchAccumulator {
    /// Pending requests awaiting the next flush
    pending: Arc<Mutex<Vec<ApiRequest>>>,

    /// Size ceiling that closes a window early
    max_batch_size: usize,

    /// Flush window duration
    batch_delay: Duration,

    /// Signals the transition from idle to non-empty
    wake: Arc<Notify>,

    /// Signals that the pending queue reached the ceiling
    full: Arc<Notify>,
}

impl BatchAccumulator {
    /// Create a new accumulator
    pub fn new(max_batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
            max_batch_size,
            batch_delay,
            wake: Arc::new(Notify::new()),
            full: Arc::new(Notify::new()),
        }
    }

    /// Add a request to the pending queue
    pub async fn enqueue(&self, request: ApiRequest) {
        let mut pending = self.pending.lock().await;
        pending.push(request);
        let len = pending.len();
        drop(pending);

        debug!(
            pending = len,
            ceiling = self.max_batch_size,
            "Request enqueued"
        );

        if len == 1 {
            self.wake.notify_one();
        }
        if len >= self.max_batch_size {
            self.full.notify_one();
        }
    }

    /// Number of requests waiting for the next flush
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Take the full pending snapshot, leaving the queue empty
    pub async fn drain(&self) -> Vec<ApiRequest> {
        let mut pending = self.pending.lock().await;
        std::mem::take(&mut *pending)
    }

    /// Wait until the next batch is due: the queue is non-empty and either
    /// the flush window elapsed or the size ceiling was reached
    pub async fn next_window(&self) {
        loop {
            if !self.pending.lock().await.is_empty() {
                break;
            }
            self.wake.notified().await;
        }

        // Already at the ceiling, flush without waiting out the window
        if self.pending.lock().await.len() >= self.max_batch_size {
            return;
        }

        let deadline = tokio::time::sleep(self.batch_delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = self.full.notified() => {
                    // A ceiling permit can be left over from a batch that was
                    // already drained; only a genuinely full queue ends the
                    // window early.
                    if self.pending.lock().await.len() >= self.max_batch_size {
                        break;
                    }
                }
            }
        }
    }
}
