//! Content-script relay
//!
//! One relay per page context. It assigns correlation ids to the page's
//! calls, forwards them to the executor and routes each response back to the
//! call that issued it. Provider events for the page are queued in arrival
//! order; an event is always queued before the response that followed it on
//! the executor side.

use crate::correlation::{CorrelationRegistry, CorrelationStats};
use crate::envelope::{Envelope, PageMessage, ProviderEvent, RpcResult};
use crate::events::{PortId, PortMessage};
use crate::executor::{BackgroundExecutor, requires_consent};
use crate::{RelayError, Result};
use layerz_wallet_core::Origin;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Relay timeouts
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bound on calls that never wait for the user
    pub request_timeout: Duration,
    /// Bound on consent-gated calls
    pub consent_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            consent_timeout: Duration::from_secs(125),
        }
    }
}

impl RelayConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    fn timeout_for(&self, method: &str) -> Duration {
        if requires_consent(method) {
            self.consent_timeout
        } else {
            self.request_timeout
        }
    }
}

/// Proxy between one page context and the executor
pub struct ContentScriptRelay {
    config: RelayConfig,
    origin: Origin,
    port: PortId,
    executor: Arc<BackgroundExecutor>,
    registry: Arc<CorrelationRegistry>,
    events: Mutex<mpsc::UnboundedReceiver<ProviderEvent>>,
    dispatcher: JoinHandle<()>,
    closed: AtomicBool,
}

impl ContentScriptRelay {
    /// Attach a relay for a page at `origin`. Must run inside a tokio runtime.
    pub fn connect(
        executor: Arc<BackgroundExecutor>,
        origin: &str,
        config: RelayConfig,
    ) -> Result<Self> {
        let origin = Origin::parse(origin)?;
        let (port, mut inbound) = executor.connect(origin.clone());
        let registry = Arc::new(CorrelationRegistry::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let dispatcher = {
            let registry = Arc::clone(&registry);
            let origin = origin.clone();
            tokio::spawn(async move {
                while let Some(message) = inbound.recv().await {
                    match message {
                        PortMessage::Response { id, result, ack } => {
                            match registry.resolve(id, &origin, result) {
                                Ok(_) => {
                                    if let Some(ack) = ack {
                                        let _ = ack.send(());
                                    }
                                }
                                // Late or foreign responses are dropped
                                Err(e) => debug!(%origin, id = %id, error = %e, "Response dropped"),
                            }
                        }
                        PortMessage::Event(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        debug!(%origin, %port, "Relay attached");
        Ok(Self {
            config,
            origin,
            port,
            executor,
            registry,
            events: Mutex::new(event_rx),
            dispatcher,
            closed: AtomicBool::new(false),
        })
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    /// Call a provider method and wait for its outcome
    pub async fn request(&self, method: &str, params: Value) -> RpcResult {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::ChannelClosed(format!("relay for {}", self.origin)).to_rpc_error());
        }

        let (id, rx) = self.registry.register(self.origin.clone(), method);
        self.registry.mark_forwarded(id);
        self.executor
            .handle_page_request(self.port, Envelope::request(id, method, params));

        self.registry
            .wait(id, rx, self.config.timeout_for(method))
            .await
    }

    /// Handle a raw envelope posted by the page. Returns the response
    /// envelope, carrying the page's own id, or `None` if the message is
    /// not a valid request.
    pub async fn handle_page_message(&self, raw: &str) -> Option<String> {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(origin = %self.origin, error = %e, "Malformed page message dropped");
                return None;
            }
        };
        if !envelope.is_request() {
            debug!(origin = %self.origin, id = %envelope.id, "Non-request page message ignored");
            return None;
        }

        let page_id = envelope.id;
        let params = envelope.params();
        let method = envelope.method.unwrap_or_default();
        let result = self.request(&method, params).await;

        match serde_json::to_string(&Envelope::response(page_id, result)) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "Failed to encode response");
                None
            }
        }
    }

    /// Next provider event, waiting if none is queued
    pub async fn next_event(&self) -> Option<ProviderEvent> {
        self.events.lock().await.recv().await
    }

    /// Next provider event if one is already queued
    pub async fn try_next_event(&self) -> Option<ProviderEvent> {
        self.events.lock().await.try_recv().ok()
    }

    /// Wire form of an event for the page
    pub fn event_json(event: &ProviderEvent) -> Result<String> {
        Ok(serde_json::to_string(&PageMessage::Event(event.to_envelope()))?)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub fn stats(&self) -> CorrelationStats {
        self.registry.stats()
    }

    /// Page teardown: release every pending slot without delivery and detach
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.registry.release_all();
        self.executor.disconnect(self.port);
        self.dispatcher.abort();
        debug!(origin = %self.origin, released, "Relay closed");
    }
}

impl Drop for ContentScriptRelay {
    fn drop(&mut self) {
        self.close();
    }
}
