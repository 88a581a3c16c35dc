//! Request correlation registry
//!
//! Every page request gets a fresh id and a oneshot slot. The slot leaves the
//! registry through exactly one of [`CorrelationRegistry::resolve`],
//! [`CorrelationRegistry::time_out`] or [`CorrelationRegistry::release_all`];
//! whichever removes it first wins and the others become no-ops.

use crate::envelope::{RequestId, RpcError, RpcResult};
use crate::{RelayError, Result};
use dashmap::DashMap;
use layerz_wallet_core::{Error, Origin};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle of a page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Page invoked a provider method
    Received,
    /// Id assigned and request posted to the executor
    Forwarded,
    /// Delivered with a result
    Resolved,
    /// Delivered with an error
    Rejected,
    /// No response within the bound
    TimedOut,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Resolved | RequestState::Rejected | RequestState::TimedOut
        )
    }
}

struct PendingRequest {
    origin: Origin,
    method: String,
    state: RequestState,
    created_at: Instant,
    tx: oneshot::Sender<RpcResult>,
}

/// Registry statistics
#[derive(Debug, Default, Clone)]
pub struct CorrelationStats {
    pub total_registered: u64,
    pub total_resolved: u64,
    pub total_rejected: u64,
    pub total_timed_out: u64,
    /// Slots dropped without delivery on page teardown
    pub total_released: u64,
}

/// Pending requests of one page context
pub struct CorrelationRegistry {
    next_id: AtomicU64,
    pending: DashMap<RequestId, PendingRequest>,
    stats: Arc<RwLock<CorrelationStats>>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            stats: Arc::new(RwLock::new(CorrelationStats::default())),
        }
    }

    /// Allocate an id for a new request and return the slot its outcome
    /// arrives on
    pub fn register(
        &self,
        origin: Origin,
        method: impl Into<String>,
    ) -> (RequestId, oneshot::Receiver<RpcResult>) {
        let method = method.into();
        let (tx, rx) = oneshot::channel();

        // Ids wrap at 2^53 - 1; skip any still in use
        let id = loop {
            let id = RequestId::wrapping(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !self.pending.contains_key(&id) {
                break id;
            }
        };

        self.pending.insert(
            id,
            PendingRequest {
                origin,
                method,
                state: RequestState::Received,
                created_at: Instant::now(),
                tx,
            },
        );
        self.stats.write().total_registered += 1;

        (id, rx)
    }

    /// Record that the request was posted to the executor
    pub fn mark_forwarded(&self, id: RequestId) {
        if let Some(mut pending) = self.pending.get_mut(&id) {
            pending.state = RequestState::Forwarded;
        }
    }

    /// State of a pending request; `None` once it has left the registry
    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.pending.get(&id).map(|p| p.state)
    }

    /// Deliver the outcome for `id`. Only a response addressed to the
    /// request's own origin is accepted.
    pub fn resolve(&self, id: RequestId, origin: &Origin, result: RpcResult) -> Result<RequestState> {
        let Some((_, pending)) = self.pending.remove_if(&id, |_, p| p.origin == *origin) else {
            if let Some(pending) = self.pending.get(&id) {
                warn!(id = %id, expected = %pending.origin, actual = %origin, "Response origin mismatch");
                return Err(RelayError::OriginMismatch {
                    expected: pending.origin.to_string(),
                    actual: origin.to_string(),
                });
            }
            debug!(id = %id, "Response for unknown request dropped");
            return Err(RelayError::UnknownRequest(id.get()));
        };

        let state = if result.is_ok() {
            RequestState::Resolved
        } else {
            RequestState::Rejected
        };
        {
            let mut stats = self.stats.write();
            match state {
                RequestState::Resolved => stats.total_resolved += 1,
                _ => stats.total_rejected += 1,
            }
        }

        debug!(
            id = %id,
            method = %pending.method,
            state = ?state,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Request settled"
        );
        // The waiter may already be gone; the slot is consumed either way
        let _ = pending.tx.send(result);
        Ok(state)
    }

    /// Terminate `id` with a timeout error. Returns `false` if it had
    /// already left the registry.
    pub fn time_out(&self, id: RequestId) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            return false;
        };
        self.stats.write().total_timed_out += 1;

        warn!(id = %id, method = %pending.method, origin = %pending.origin, "Request timed out");
        let error = Error::Timeout(format!("response to {}", pending.method));
        let _ = pending.tx.send(Err(RpcError::from(error)));
        true
    }

    /// Time out every request older than `max_age`
    pub fn sweep(&self, max_age: Duration) -> Vec<RequestId> {
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|entry| entry.created_at.elapsed() >= max_age)
            .map(|entry| *entry.key())
            .collect();

        expired.into_iter().filter(|id| self.time_out(*id)).collect()
    }

    /// Drop every pending slot without delivery. Used when the page goes away.
    pub fn release_all(&self) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let released = ids
            .into_iter()
            .filter(|id| self.pending.remove(id).is_some())
            .count();

        if released > 0 {
            self.stats.write().total_released += released as u64;
            debug!(released, "Released pending requests");
        }
        released
    }

    /// Wait for the outcome of `id`, timing it out after `timeout`
    pub async fn wait(
        &self,
        id: RequestId,
        mut rx: oneshot::Receiver<RpcResult>,
        timeout: Duration,
    ) -> RpcResult {
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RelayError::ChannelClosed(format!("request {} released", id)).to_rpc_error()),
            Err(_) => {
                // Lost the race to a concurrent resolve: its value is already in the slot
                self.time_out(id);
                rx.await.unwrap_or_else(|_| {
                    Err(RelayError::ChannelClosed(format!("request {} released", id)).to_rpc_error())
                })
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> CorrelationStats {
        self.stats.read().clone()
    }
}
