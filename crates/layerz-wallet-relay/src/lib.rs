//! # LayerzWallet Relay
//!
//! The privileged background side of the wallet and the bridge that connects
//! untrusted pages to it.
//!
//! ## Components
//!
//! - **Background Executor**: owns the Key Vault, Permission Store, network
//!   providers and swap registry; serves page methods and UI operations
//! - **Request Correlation Registry**: matches responses to pending page
//!   requests by id, exactly once, with timeouts
//! - **Event Hub**: one ordered channel per connected page carrying both
//!   responses and `accountsChanged` / `chainChanged` events
//! - **Consent Broker**: raises consent requests for gated methods and
//!   collects Allow/Deny decisions with delivery receipts
//! - **Content-Script Relay**: per-page proxy that assigns correlation ids
//!   and routes responses and events back to its page
//! - **Bridge Server** (feature `server`): HTTP/WebSocket transport for pages
//!   and the consent UI
//!
//! ## Request Flow
//!
//! ```text
//! Page ──► Relay ──► Executor ──► Permission Store
//!  ▲         │          │
//!  │         │          ├──► Consent Broker ──► Consent UI
//!  │         │          │                          │
//!  │         │          ◄──────── Allow/Deny ──────┘
//!  │         │          │
//!  │         │          ├──► Network Account Provider
//!  │         │          │
//!  └─────────◄──────────┘  (response, id-correlated)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use layerz_wallet_relay::{BackgroundExecutor, ContentScriptRelay, ExecutorConfig, RelayConfig};
//!
//! let executor = BackgroundExecutor::new(ExecutorConfig::default(), store, providers, swaps, rates).await?;
//! let relay = ContentScriptRelay::connect(executor.clone(), "https://dapp.example", RelayConfig::default())?;
//!
//! let accounts = relay.request("eth_requestAccounts", serde_json::json!([])).await;
//! ```

pub mod consent;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod events;
pub mod executor;
pub mod relay;

#[cfg(feature = "server")]
pub mod server;

pub use consent::{
    ConsentBroker, ConsentDecision, ConsentEvent, ConsentReply, ConsentRequest, ConsentStatus,
    DeliveryReceipt,
};
pub use correlation::{CorrelationRegistry, CorrelationStats, RequestState};
pub use envelope::{
    Envelope, EventEnvelope, PageMessage, ProviderEvent, RequestId, RpcError, RpcResult, Target,
};
pub use error::{RelayError, Result};
pub use events::{EventHub, PortId, PortMessage};
pub use executor::{BackgroundExecutor, ExecutorConfig, SessionState};
pub use relay::{ContentScriptRelay, RelayConfig};

#[cfg(feature = "server")]
pub use server::{BridgeServer, ServerConfig};

/// Re-export core types for convenience
pub use layerz_wallet_core::{Network, Origin};
