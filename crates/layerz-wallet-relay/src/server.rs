//! HTTP/WebSocket bridge for pages and wallet screens
//!
//! - `GET /v1/page`: one page context per WebSocket, origin taken from the
//!   `Origin` header. Pages post request envelopes and receive response and
//!   event envelopes.
//! - `GET /v1/consent`: consent UI socket. Pushes consent requests and takes
//!   `{requestId, allow, reason?}` decisions.
//! - `POST /v1/consent/decide`: the same decision over plain HTTP.
//! - `POST /v1/ui/rpc`: privileged operations, `{method, params}`.
//!
//! ## Production Features
//!
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Request timeout middleware
//! - CORS configuration

use crate::consent::{ConsentDecision, ConsentEvent};
use crate::envelope::RpcError;
use crate::executor::BackgroundExecutor;
use crate::relay::{ContentScriptRelay, RelayConfig};
use crate::RelayError;
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "layerz-wallet-relay";

/// Bridge server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Enable CORS
    pub cors_enabled: bool,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// How long a decision waits for its delivery receipt
    pub delivery_timeout_secs: u64,
    /// Timeouts of page relays opened by this server
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_enabled: true,
            request_timeout_secs: 30,
            delivery_timeout_secs: 5,
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set request timeout
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_delivery_timeout(mut self, secs: u64) -> Self {
        self.delivery_timeout_secs = secs;
        self
    }

    pub fn with_relay_config(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Disable CORS
    pub fn without_cors(mut self) -> Self {
        self.cors_enabled = false;
        self
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub executor: Arc<BackgroundExecutor>,
    pub config: ServerConfig,
    /// Service start time
    pub started_at: Instant,
    /// Open consent UI sockets
    pub consent_sockets: AtomicUsize,
}

/// Bridge server
pub struct BridgeServer {
    state: Arc<AppState>,
}

impl BridgeServer {
    pub fn new(executor: Arc<BackgroundExecutor>, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(AppState {
                executor,
                config,
                started_at: Instant::now(),
                consent_sockets: AtomicUsize::new(0),
            }),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let state = Arc::clone(&self.state);
        let timeout = Duration::from_secs(self.state.config.request_timeout_secs);

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/v1/page", get(page_websocket))
            .route("/v1/consent", get(consent_websocket))
            .route("/v1/consent/pending", get(pending_consents))
            .route("/v1/consent/decide", post(decide_consent))
            .route("/v1/ui/rpc", post(ui_rpc))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::with_status_code(
                        StatusCode::REQUEST_TIMEOUT,
                        timeout,
                    )),
            )
            .with_state(state);

        if self.state.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Serve until SIGINT/SIGTERM
    pub async fn serve(self, addr: impl Into<SocketAddr>) -> anyhow::Result<()> {
        let addr = addr.into();
        info!(address = %addr, "Starting wallet bridge");

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Pending page calls end as rejections rather than hanging
        let dismissed = self.state.executor.consent().dismiss_all();
        info!(dismissed, "Wallet bridge stopped");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error response that implements IntoResponse
pub struct ApiError {
    status: StatusCode,
    error: RpcError,
}

impl ApiError {
    pub fn new(status: StatusCode, error: RpcError) -> Self {
        Self { status, error }
    }

    pub fn from_relay_error(e: RelayError) -> Self {
        Self {
            status: StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error: e.to_rpc_error(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_relay_error(RelayError::InvalidEnvelope(message.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::<()>::error(self.error));
        (self.status, body).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self::from_relay_error(e)
    }
}

impl From<layerz_wallet_core::Error> for ApiError {
    fn from(e: layerz_wallet_core::Error) -> Self {
        Self::from_relay_error(RelayError::from(e))
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: RpcError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Privileged operation call
#[derive(Debug, Deserialize)]
pub struct UiRpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Consent decision from the UI
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMessage {
    pub request_id: u64,
    pub allow: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DecisionMessage {
    fn decision(self) -> ConsentDecision {
        if self.allow {
            ConsentDecision::Allow
        } else {
            ConsentDecision::Deny {
                reason: self.reason,
            }
        }
    }
}

/// Outcome of a decision
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub request_id: u64,
    /// Whether the request was still pending
    pub applied: bool,
    /// Whether the page relay received the response
    pub delivered: bool,
}

/// Readiness details
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub connected_pages: usize,
    pub pending_consents: usize,
    pub unlocked: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let executor = &state.executor;
    Json(ApiResponse::success(ReadyResponse {
        status: "ready".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connected_pages: executor.events().port_count(),
        pending_consents: executor.consent().pending_count(),
        unlocked: executor.has_mnemonic().await,
    }))
}

async fn ui_rpc(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UiRpcRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state
        .executor
        .handle_ui_request(&req.method, req.params)
        .await?;
    Ok(Json(ApiResponse::success(data)))
}

async fn pending_consents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.executor.consent().pending()))
}

async fn decide_consent(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<DecisionMessage>,
) -> impl IntoResponse {
    Json(ApiResponse::success(apply_decision(&state, msg).await))
}

async fn apply_decision(state: &AppState, msg: DecisionMessage) -> DecisionOutcome {
    let request_id = msg.request_id;
    let receipt = state.executor.consent().decide(request_id, msg.decision());
    let applied = !receipt.is_noop();
    let delivered = receipt
        .delivered_within(Duration::from_secs(state.config.delivery_timeout_secs))
        .await;

    DecisionOutcome {
        request_id,
        applied,
        delivered,
    }
}

/// Page WebSocket
async fn page_websocket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Origin header required"))?
        .to_string();

    let relay = ContentScriptRelay::connect(
        Arc::clone(&state.executor),
        &origin,
        state.config.relay.clone(),
    )?;

    Ok(ws.on_upgrade(move |socket| handle_page_socket(socket, Arc::new(relay))))
}

async fn handle_page_socket(socket: WebSocket, relay: Arc<ContentScriptRelay>) {
    let (mut sender, mut receiver) = socket.split();
    let (response_tx, mut response_rx) = mpsc::unbounded_channel::<String>();

    loop {
        // Events first: one queued before a response must reach the page first
        tokio::select! {
            biased;
            Some(event) = relay.next_event() => {
                let Ok(json) = ContentScriptRelay::event_json(&event) else { continue };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Some(response) = response_rx.recv() => {
                if sender.send(Message::Text(response.into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let relay = Arc::clone(&relay);
                    let response_tx = response_tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = relay.handle_page_message(text.as_str()).await {
                            let _ = response_tx.send(response);
                        }
                    });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(origin = %relay.origin(), error = %e, "Page WebSocket error");
                    break;
                }
                _ => {}
            },
        }
    }

    relay.close();
}

/// Consent UI WebSocket
async fn consent_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_consent_socket(socket, state))
}

async fn handle_consent_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let broker = state.executor.consent();
    let mut event_rx = broker.subscribe();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<DecisionOutcome>();
    state.consent_sockets.fetch_add(1, Ordering::AcqRel);

    // Requests raised before this UI opened
    for request in broker.pending() {
        let event = ConsentEvent::ConsentRequested { request };
        if let Ok(json) = serde_json::to_string(&event)
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            break;
        }
    }

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event)
                        && sender.send(Message::Text(json.into())).await.is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Consent UI lagging behind events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(outcome) = outcome_rx.recv() => {
                let json = serde_json::json!({ "type": "decision_outcome", "outcome": outcome });
                if sender.send(Message::Text(json.to_string().into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<DecisionMessage>(text.as_str()) {
                        Ok(decision) => {
                            let state = Arc::clone(&state);
                            let outcome_tx = outcome_tx.clone();
                            tokio::spawn(async move {
                                let outcome = apply_decision(&state, decision).await;
                                let _ = outcome_tx.send(outcome);
                            });
                        }
                        Err(e) => debug!(error = %e, "Invalid consent message ignored"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(error = %e, "Consent WebSocket error");
                    break;
                }
                _ => {}
            },
        }
    }

    // Last consent UI gone: nothing can answer the pending requests any more
    if state.consent_sockets.fetch_sub(1, Ordering::AcqRel) == 1 {
        broker.dismiss_all();
    }
}
