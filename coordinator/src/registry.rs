//! Outstanding promise tracking
//!
//! Each logical request in flight owns exactly one slot keyed by request id.
//! Settlement removes the slot and wakes the caller; a periodic sweep rejects
//! slots that were never settled so no caller is held forever.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CoordinatorError, Result};

/// One unsettled request slot
struct PendingSlot {
    /// Settlement channel back to the caller
    tx: oneshot::Sender<Result<Value>>,

    /// Creation timestamp for staleness cleanup
    created_at: Instant,
}

/// Registry of outstanding request promises keyed by request id
#[derive(Debug, Clone)]
pub struct PromiseRegistry {
    slots: Arc<Mutex<HashMap<String, PendingSlot>>>,
}

impl std::fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSlot")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl PromiseRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new outstanding request and return its settlement receiver.
    ///
    /// A duplicate id replaces the previous slot; the earlier caller is
    /// rejected rather than left hanging.
    pub async fn register(&self, id: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        let slot = PendingSlot {
            tx,
            created_at: Instant::now(),
        };

        let previous = self.slots.lock().await.insert(id.to_string(), slot);
        if let Some(previous) = previous {
            warn!(id = id, "Duplicate request id, rejecting earlier promise");
            let _ = previous.tx.send(Err(CoordinatorError::internal(format!(
                "request id reused while outstanding: {}",
                id
            ))));
        }

        rx
    }

    /// Resolve an outstanding request with a payload
    pub async fn resolve(&self, id: &str, value: Value) -> bool {
        self.settle(id, Ok(value)).await
    }

    /// Reject an outstanding request with an error
    pub async fn reject(&self, id: &str, error: CoordinatorError) -> bool {
        self.settle(id, Err(error)).await
    }

    /// Remove the slot and send the outcome; at most one settlement per id
    async fn settle(&self, id: &str, outcome: Result<Value>) -> bool {
        let slot = self.slots.lock().await.remove(id);
        match slot {
            Some(slot) => {
                if slot.tx.send(outcome).is_err() {
                    debug!(id = id, "Caller no longer waiting, outcome dropped");
                }
                true
            }
            None => {
                debug!(id = id, "No outstanding promise for id");
                false
            }
        }
    }

    /// Reject every outstanding request, e.g. on cancellation or shutdown
    pub async fn reject_all<F>(&self, error_for: F) -> usize
    where
        F: Fn(&str) -> CoordinatorError,
    {
        let mut slots = self.slots.lock().await;
        let count = slots.len();
        for (id, slot) in slots.drain() {
            let _ = slot.tx.send(Err(error_for(&id)));
        }
        count
    }

    /// Reject slots older than the staleness threshold with a timeout error
    pub async fn sweep_stale(&self, stale_after: Duration) -> usize {
        let mut slots = self.slots.lock().await;
        let stale: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.created_at.elapsed() > stale_after)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some(slot) = slots.remove(id) {
                warn!(id = id.as_str(), "Rejecting stale promise");
                let _ = slot.tx.send(Err(CoordinatorError::timeout(id.clone())));
            }
        }
        stale.len()
    }

    /// Number of outstanding promises
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Check if no promises are outstanding
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Start the background staleness sweep task
    pub fn start_sweep_task(&self, interval: Duration, stale_after: Duration) -> JoinHandle<()> {
        let registry = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);

            loop {
                timer.tick().await;
                let swept = registry.sweep_stale(stale_after).await;
                if swept > 0 {
                    warn!(swept = swept, "Rejected stale promises");
                }
            }
        })
    }
}

impl Default for PromiseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_settles_caller() {
        let registry = PromiseRegistry::new();
        let rx = registry.register("r1").await;

        assert!(registry.resolve("r1", json!({"ok": true})).await);
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_settle_is_exactly_once() {
        let registry = PromiseRegistry::new();
        let _rx = registry.register("r1").await;

        assert!(registry.resolve("r1", json!(1)).await);
        assert!(!registry.resolve("r1", json!(2)).await);
        assert!(!registry.reject("r1", CoordinatorError::no_response("r1")).await);
    }

    #[tokio::test]
    async fn test_reject_all() {
        let registry = PromiseRegistry::new();
        let rx1 = registry.register("r1").await;
        let rx2 = registry.register("r2").await;

        let rejected = registry
            .reject_all(|id| CoordinatorError::cancelled(id.to_string()))
            .await;
        assert_eq!(rejected, 2);

        assert!(matches!(
            rx1.await.unwrap(),
            Err(CoordinatorError::Cancelled { .. })
        ));
        assert!(matches!(
            rx2.await.unwrap(),
            Err(CoordinatorError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_sweep_rejects_stale_only() {
        let registry = PromiseRegistry::new();
        let rx_old = registry.register("old").await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        let _rx_new = registry.register("new").await;

        let swept = registry.sweep_stale(Duration::from_millis(40)).await;
        assert_eq!(swept, 1);
        assert_eq!(registry.len().await, 1);
        assert!(matches!(
            rx_old.await.unwrap(),
            Err(CoordinatorError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejects_previous() {
        let registry = PromiseRegistry::new();
        let rx_first = registry.register("r1").await;
        let rx_second = registry.register("r1").await;

        assert!(matches!(
            rx_first.await.unwrap(),
            Err(CoordinatorError::Internal(_))
        ));

        registry.resolve("r1", json!(42)).await;
        assert_eq!(rx_second.await.unwrap().unwrap(), json!(42));
    }
}
