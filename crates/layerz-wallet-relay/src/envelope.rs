//! Wire envelopes exchanged between pages, the relay and the executor
//!
//! Requests and responses share one shape:
//!
//! ```json
//! { "for": "background", "id": 7, "method": "eth_accounts", "params": [] }
//! { "for": "webpage", "id": 7, "response": ["0x..."] }
//! { "for": "webpage", "id": 7, "error": { "code": 4001, "message": "User rejected the request." } }
//! ```
//!
//! Provider events use a separate shape:
//!
//! ```json
//! { "for": "webpage", "type": "eventCallback", "event": "accountsChanged", "arg": ["0x..."] }
//! ```

use crate::{RelayError, Result};
use layerz_wallet_core::error::codes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Largest integer a page can represent exactly (2^53 - 1)
pub const MAX_SAFE_ID: u64 = (1 << 53) - 1;

/// Value of the `type` field on event envelopes
pub const EVENT_CALLBACK: &str = "eventCallback";

/// Recipient context of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Webpage,
    Background,
}

/// Correlation id: a positive JS-safe integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 || id > MAX_SAFE_ID {
            return Err(RelayError::InvalidId(id.to_string()));
        }
        Ok(Self(id))
    }

    /// Map a monotonically increasing counter onto `1..=MAX_SAFE_ID`
    pub fn wrapping(counter: u64) -> Self {
        Self(counter.wrapping_sub(1) % MAX_SAFE_ID + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for RequestId {
    type Error = RelayError;

    fn try_from(id: u64) -> Result<Self> {
        Self::new(id)
    }
}

impl From<RequestId> for u64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error object carried by a response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `4001 User rejected the request.`
    pub fn user_rejected() -> Self {
        Self::from(&layerz_wallet_core::Error::UserRejected)
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code == codes::USER_REJECTED
    }
}

impl From<&layerz_wallet_core::Error> for RpcError {
    fn from(e: &layerz_wallet_core::Error) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<layerz_wallet_core::Error> for RpcError {
    fn from(e: layerz_wallet_core::Error) -> Self {
        Self::from(&e)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Outcome delivered for one request
pub type RpcResult = std::result::Result<Value, RpcError>;

/// Request or response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "for")]
    pub target: Target,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Envelope {
    /// Request envelope for the background context
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            target: Target::Background,
            id,
            method: Some(method.into()),
            params: Some(params),
            response: None,
            error: None,
        }
    }

    /// Response envelope for a page
    pub fn response(id: RequestId, result: RpcResult) -> Self {
        let (response, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            target: Target::Webpage,
            id,
            method: None,
            params: None,
            response,
            error,
        }
    }

    /// Parse and validate a raw envelope
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| RelayError::InvalidEnvelope(e.to_string()))?;

        if envelope.error.is_some() && envelope.response.is_some() {
            return Err(RelayError::InvalidEnvelope(
                "response and error are mutually exclusive".into(),
            ));
        }
        Ok(envelope)
    }

    /// Whether this envelope is a request addressed to the background
    pub fn is_request(&self) -> bool {
        self.target == Target::Background && self.method.is_some()
    }

    /// Method name of a request
    pub fn method(&self) -> Result<&str> {
        self.method
            .as_deref()
            .ok_or_else(|| RelayError::InvalidEnvelope(format!("request {} has no method", self.id)))
    }

    /// Params of a request, `[]` if absent
    pub fn params(&self) -> Value {
        self.params.clone().unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Outcome carried by a response envelope
    pub fn into_result(self) -> RpcResult {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.response.unwrap_or(Value::Null)),
        }
    }
}

/// Provider event pushed to permitted pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Addresses now visible to the page (empty when locked or revoked)
    AccountsChanged(Vec<String>),
    /// Hex chain id of the active EVM network, or the network id otherwise
    ChainChanged(String),
}

impl ProviderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::AccountsChanged(_) => "accountsChanged",
            ProviderEvent::ChainChanged(_) => "chainChanged",
        }
    }

    pub fn to_envelope(&self) -> EventEnvelope {
        let arg = match self {
            ProviderEvent::AccountsChanged(accounts) => serde_json::json!(accounts),
            ProviderEvent::ChainChanged(chain) => Value::String(chain.clone()),
        };
        EventEnvelope {
            target: Target::Webpage,
            kind: EVENT_CALLBACK.to_string(),
            event: self.name().to_string(),
            arg,
        }
    }
}

/// Event envelope as seen by the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "for")]
    pub target: Target,
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub arg: Value,
}

/// Anything the relay posts to its page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageMessage {
    Event(EventEnvelope),
    Response(Envelope),
}
