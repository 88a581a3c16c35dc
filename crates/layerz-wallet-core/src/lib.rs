//! # LayerzWallet Core
//!
//! Core library for the LayerzWallet background service: a non-custodial,
//! multi-network Bitcoin wallet whose pages talk to a single background
//! executor.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Key Vault**: BIP39 mnemonic encrypted at rest (Argon2id + ChaCha20-Poly1305),
//!   unlocked into memory for the duration of a session
//! - **Key Derivation**: deterministic per-network addresses from `(mnemonic, network, index)`
//! - **Network Account Providers**: balance, history, signing and broadcast for
//!   EVM sidechains, on-chain Bitcoin and SDK-backed Lightning/Spark/Ark
//! - **Swap Registry**: cross-network swap providers keyed by network pair
//! - **Permission Store**: per-origin dApp whitelist, persisted
//! - **Exchange Rates**: cached fiat prices
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use layerz_wallet_core::{KeyVault, KdfParams, MemoryStore, Network};
//! use std::sync::Arc;
//!
//! let vault = KeyVault::new(Arc::new(MemoryStore::new()), KdfParams::default());
//! let phrase = vault.create("correct horse").await?;
//!
//! let address = vault.address(Network::Rootstock, 0).await?;
//! ```
//!
//! ## Security Model
//!
//! The mnemonic only exists in plaintext inside an unlocked session. Account
//! keys are derived on demand and dropped (zeroized) after each signature.

pub mod chain;
pub mod error;
pub mod keys;
pub mod network;
pub mod permission;
pub mod rates;
pub mod storage;
pub mod swap;
pub mod vault;

pub use error::{Error, ErrorCategory, Result};
pub use network::{Network, NetworkFamily, NetworkInfo};
pub use permission::{Origin, Permission, PermissionStore};
pub use rates::ExchangeRates;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use swap::{SwapProvider, SwapProviderBoltz, SwapQuote, SwapRegistry};
pub use vault::{EncryptedMnemonic, KdfParams, KeyVault};

pub use chain::{
    Balance, NetworkAccountProvider, ProviderEndpoints, ProviderRegistry, SignedTx, TxHash,
    TxParams, TxRecord, UnsignedTx,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
