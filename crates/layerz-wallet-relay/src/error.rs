//! Error types for the relay and executor

use crate::envelope::RpcError;
use layerz_wallet_core::error::codes;
use thiserror::Error;

/// Relay service errors
#[derive(Debug, Error)]
pub enum RelayError {
    // ============ Wallet Errors ============
    /// Error raised by the wallet core, surfaced with its own code
    #[error(transparent)]
    Wallet(#[from] layerz_wallet_core::Error),

    // ============ Protocol Errors ============
    /// Envelope could not be parsed or is missing fields
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Correlation id is not a positive JS-safe integer
    #[error("Invalid request id: {0}")]
    InvalidId(String),

    /// Response for an id with no pending request
    #[error("Unknown request id: {0}")]
    UnknownRequest(u64),

    /// Response addressed to a different origin than the request
    #[error("Origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    // ============ Consent Errors ============
    /// Consent request id not pending
    #[error("Consent request not found: {0}")]
    ConsentNotFound(u64),

    // ============ Channel Errors ============
    /// Peer context went away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Page-facing numeric code
    pub fn code(&self) -> i64 {
        match self {
            RelayError::Wallet(e) => e.code(),
            RelayError::InvalidEnvelope(_)
            | RelayError::InvalidId(_)
            | RelayError::Serialization(_) => codes::INVALID_PARAMS,
            _ => codes::INTERNAL,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Wallet(e) => match e.code() {
                codes::NOT_WHITELISTED | codes::LOCKED | codes::WRONG_PASSWORD => 403,
                codes::USER_REJECTED => 403,
                codes::NO_MNEMONIC => 409,
                codes::UNSUPPORTED_METHOD => 404,
                codes::UNSUPPORTED_NETWORK
                | codes::UNSUPPORTED_SWAP_PAIR
                | codes::INVALID_PARAMS
                | codes::DERIVATION_ERROR => 400,
                codes::PROVIDER_UNAVAILABLE | codes::CHAIN_ERROR => 502,
                codes::TIMEOUT => 504,
                _ => 500,
            },
            RelayError::InvalidEnvelope(_)
            | RelayError::InvalidId(_)
            | RelayError::Serialization(_) => 400,
            RelayError::UnknownRequest(_) | RelayError::ConsentNotFound(_) => 404,
            RelayError::OriginMismatch { .. } => 403,
            RelayError::ChannelClosed(_) => 503,
            RelayError::Internal(_) => 500,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Wallet(e) => e.is_retryable(),
            RelayError::ChannelClosed(_) => true,
            _ => false,
        }
    }

    /// Wire form of this error
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(self.code(), self.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
