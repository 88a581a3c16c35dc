//! Consent broker between the executor and the consent UI
//!
//! The executor raises a [`ConsentRequest`] for gated methods and waits for
//! exactly one decision. The UI answers with [`ConsentBroker::allow`] or
//! [`ConsentBroker::deny`]; both return a [`DeliveryReceipt`] that completes
//! once the page relay has received the resulting response, so the UI knows
//! when it may close.
//!
//! A request nobody answers (UI closed, dismissed, or too slow) ends as
//! [`ConsentStatus::TimedOut`] and the page sees a user rejection.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use layerz_wallet_core::Origin;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Final status of a consent request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Allowed,
    Denied,
    TimedOut,
}

/// Consent requested from the user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub request_id: u64,
    pub origin: Origin,
    pub method: String,
    pub params: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// User decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentDecision {
    Allow,
    Deny { reason: Option<String> },
}

impl ConsentDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, ConsentDecision::Allow)
    }
}

/// Events pushed to consent UI subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsentEvent {
    /// A gated method needs a decision
    ConsentRequested { request: ConsentRequest },
    /// A request left the pending set
    ConsentResolved { request_id: u64, status: ConsentStatus },
}

/// What the executor gets back from [`ConsentBroker::request_consent`]
#[derive(Debug)]
pub struct ConsentReply {
    pub status: ConsentStatus,
    /// Fired by the relay once the page has the response
    pub ack: Option<oneshot::Sender<()>>,
}

impl ConsentReply {
    pub fn is_allowed(&self) -> bool {
        self.status == ConsentStatus::Allowed
    }
}

/// Completes once the response triggered by a decision reached the page relay
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: Option<oneshot::Receiver<()>>,
}

impl DeliveryReceipt {
    fn noop() -> Self {
        Self { rx: None }
    }

    /// Whether the decision was applied to a pending request
    pub fn is_noop(&self) -> bool {
        self.rx.is_none()
    }

    /// `true` once the response was delivered, `false` if it never will be
    pub async fn delivered(self) -> bool {
        match self.rx {
            Some(rx) => rx.await.is_ok(),
            None => false,
        }
    }

    /// [`Self::delivered`] bounded by `timeout`
    pub async fn delivered_within(self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.delivered())
            .await
            .unwrap_or(false)
    }
}

struct PendingConsent {
    request: ConsentRequest,
    tx: oneshot::Sender<ConsentReply>,
}

/// Pending consent requests and their subscribers
pub struct ConsentBroker {
    next_id: AtomicU64,
    pending: DashMap<u64, PendingConsent>,
    event_tx: broadcast::Sender<ConsentEvent>,
}

impl Default for ConsentBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentBroker {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to consent events
    pub fn subscribe(&self) -> broadcast::Receiver<ConsentEvent> {
        self.event_tx.subscribe()
    }

    /// Requests awaiting a decision, oldest first
    pub fn pending(&self) -> Vec<ConsentRequest> {
        let mut requests: Vec<ConsentRequest> =
            self.pending.iter().map(|p| p.request.clone()).collect();
        requests.sort_by_key(|r| r.request_id);
        requests
    }

    /// Raise a consent request and wait at most `timeout` for the decision
    pub async fn request_consent(
        &self,
        origin: &Origin,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> ConsentReply {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let request = ConsentRequest {
            request_id,
            origin: origin.clone(),
            method: method.to_string(),
            params,
            created_at: now,
            expires_at: chrono::Duration::from_std(timeout)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let (tx, mut rx) = oneshot::channel();
        self.pending.insert(
            request_id,
            PendingConsent {
                request: request.clone(),
                tx,
            },
        );
        info!(request_id, %origin, method, "Consent requested");
        // No subscriber yet is fine: the UI can list pending requests
        let _ = self.event_tx.send(ConsentEvent::ConsentRequested { request });

        let reply = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(_)) => None,
            Err(_) => {
                if self.pending.remove(&request_id).is_some() {
                    None
                } else {
                    // Decided just as the timer fired
                    rx.await.ok()
                }
            }
        };

        reply.unwrap_or_else(|| {
            warn!(request_id, %origin, method, "Consent timed out");
            self.publish_resolved(request_id, ConsentStatus::TimedOut);
            ConsentReply {
                status: ConsentStatus::TimedOut,
                ack: None,
            }
        })
    }

    /// Allow a pending request
    pub fn allow(&self, request_id: u64) -> DeliveryReceipt {
        self.decide(request_id, ConsentDecision::Allow)
    }

    /// Deny a pending request
    pub fn deny(&self, request_id: u64, reason: Option<String>) -> DeliveryReceipt {
        self.decide(request_id, ConsentDecision::Deny { reason })
    }

    /// Apply a decision. A request that is no longer pending ignores it.
    pub fn decide(&self, request_id: u64, decision: ConsentDecision) -> DeliveryReceipt {
        let Some((_, pending)) = self.pending.remove(&request_id) else {
            debug!(request_id, "Decision for settled consent ignored");
            return DeliveryReceipt::noop();
        };

        let status = if decision.is_allow() {
            ConsentStatus::Allowed
        } else {
            ConsentStatus::Denied
        };
        if let ConsentDecision::Deny { reason: Some(reason) } = &decision {
            info!(request_id, origin = %pending.request.origin, reason = %reason, "Consent denied");
        } else {
            info!(request_id, origin = %pending.request.origin, ?status, "Consent decided");
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let reply = ConsentReply {
            status,
            ack: Some(ack_tx),
        };
        self.publish_resolved(request_id, status);

        match pending.tx.send(reply) {
            Ok(()) => DeliveryReceipt { rx: Some(ack_rx) },
            Err(_) => DeliveryReceipt::noop(),
        }
    }

    /// Treat every pending request as unanswered. Called when the consent UI
    /// goes away.
    pub fn dismiss_all(&self) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|p| *p.key()).collect();
        // Dropping the sender wakes the waiter, which records the timeout
        let dismissed = ids
            .into_iter()
            .filter(|id| self.pending.remove(id).is_some())
            .count();
        if dismissed > 0 {
            warn!(dismissed, "Consent UI closed with pending requests");
        }
        dismissed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn publish_resolved(&self, request_id: u64, status: ConsentStatus) {
        let _ = self
            .event_tx
            .send(ConsentEvent::ConsentResolved { request_id, status });
    }
}
