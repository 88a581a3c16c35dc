//! Error types for wallet operations
//!
//! Every variant maps to a stable numeric code (see [`Error::code`]) so that
//! pages talking to the background service can branch on failures
//! deterministically.

use thiserror::Error;

/// Result type alias for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Page-facing error codes
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const NOT_WHITELISTED: i64 = 4100;
    pub const LOCKED: i64 = 4101;
    pub const NO_MNEMONIC: i64 = 4102;
    pub const WRONG_PASSWORD: i64 = 4103;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const UNSUPPORTED_NETWORK: i64 = 4901;
    pub const UNSUPPORTED_SWAP_PAIR: i64 = 4902;
    pub const PROVIDER_UNAVAILABLE: i64 = 5001;
    pub const TIMEOUT: i64 = 5002;
    pub const DERIVATION_ERROR: i64 = 5003;
    pub const CHAIN_ERROR: i64 = 5004;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

/// Coarse classification used to decide retry and surfacing behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permission, lock and consent failures. Surfaced verbatim, never retried.
    Security,
    /// Unreachable node or server. Retried only for idempotent reads.
    Transport,
    /// Unsupported network or swap pair. Never retried.
    Logic,
    /// Malformed messages. Dropped with a diagnostic.
    Protocol,
    /// Storage, encoding and other local failures
    Internal,
}

/// Errors that can occur during wallet operations
#[derive(Debug, Error)]
pub enum Error {
    // ============ Configuration Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ============ Vault Errors ============
    /// Vault holds an encrypted mnemonic but has not been unlocked
    #[error("Wallet is locked")]
    Locked,

    /// No encrypted mnemonic has been created or imported yet
    #[error("No mnemonic stored")]
    NoMnemonic,

    /// Onboarding attempted while a mnemonic already exists
    #[error("A mnemonic is already stored; wipe the wallet first")]
    MnemonicExists,

    /// AEAD authentication failed while decrypting the mnemonic
    #[error("Wrong password")]
    WrongPassword,

    /// Phrase is not a valid BIP39 mnemonic
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Encryption failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    Derivation(String),

    /// Signing or key parsing failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    // ============ Permission Errors ============
    /// Origin has no permission record
    #[error("Origin {0} is not whitelisted")]
    NotWhitelisted(String),

    /// Origin string could not be parsed
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// User denied consent or dismissed the consent surface
    #[error("User rejected the request.")]
    UserRejected,

    // ============ Network Errors ============
    /// Network id is unknown or has no provider configured
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Provider method is not handled
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// No swap provider handles the pair
    #[error("Swap pair {from}->{to} not supported by {provider}")]
    UnsupportedSwapPair {
        from: String,
        to: String,
        provider: String,
    },

    /// Request parameters are malformed
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Node or server unreachable
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Operation exceeded its time bound
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Node answered with an error
    #[error("Chain error: {0}")]
    ChainError(String),

    // ============ Storage Errors ============
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    // ============ Serialization Errors ============
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable numeric code surfaced to pages
    pub fn code(&self) -> i64 {
        match self {
            Error::UserRejected => codes::USER_REJECTED,
            Error::NotWhitelisted(_) => codes::NOT_WHITELISTED,
            Error::Locked => codes::LOCKED,
            Error::NoMnemonic => codes::NO_MNEMONIC,
            Error::WrongPassword => codes::WRONG_PASSWORD,
            Error::UnsupportedMethod(_) => codes::UNSUPPORTED_METHOD,
            Error::UnsupportedNetwork(_) => codes::UNSUPPORTED_NETWORK,
            Error::UnsupportedSwapPair { .. } => codes::UNSUPPORTED_SWAP_PAIR,
            Error::ProviderUnavailable(_) => codes::PROVIDER_UNAVAILABLE,
            Error::Timeout(_) => codes::TIMEOUT,
            Error::Derivation(_) | Error::InvalidMnemonic(_) => codes::DERIVATION_ERROR,
            Error::ChainError(_) => codes::CHAIN_ERROR,
            Error::InvalidParams(_) | Error::InvalidOrigin(_) | Error::Deserialization(_) => {
                codes::INVALID_PARAMS
            }
            _ => codes::INTERNAL,
        }
    }

    /// Classification of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UserRejected
            | Error::NotWhitelisted(_)
            | Error::Locked
            | Error::NoMnemonic
            | Error::WrongPassword
            | Error::InvalidOrigin(_) => ErrorCategory::Security,
            Error::ProviderUnavailable(_) | Error::Timeout(_) => ErrorCategory::Transport,
            Error::UnsupportedNetwork(_)
            | Error::UnsupportedSwapPair { .. }
            | Error::UnsupportedMethod(_)
            | Error::ChainError(_) => ErrorCategory::Logic,
            Error::InvalidParams(_) | Error::Deserialization(_) => ErrorCategory::Protocol,
            _ => ErrorCategory::Internal,
        }
    }

    /// Transport failures may be retried, and only for idempotent reads
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(format!("provider response: {}", e))
        } else {
            Error::ProviderUnavailable(e.to_string())
        }
    }
}
