//! Supported networks and their fixed capability set
//!
//! Each [`Network`] carries a static [`NetworkInfo`] describing its ticker,
//! decimals, derivation scheme and whether it is a testnet. Callers query the
//! table instead of switching on the network id.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network identifier, serialized as the lowercase wire string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bitcoin,
    Sepolia,
    Rootstock,
    Botanix,
    Strata,
    Citrea,
    Ark,
    Breez,
    BreezTest,
    Spark,
}

/// Address family a network belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamily {
    Bitcoin,
    Evm,
    Ark,
    Lightning,
    Spark,
}

/// How the public key of a derived account is turned into an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    /// Native segwit v0 (P2WPKH)
    SegwitV0,
    /// Taproot key-path (P2TR)
    Taproot,
    /// Keccak-256 of the uncompressed public key, last 20 bytes
    Evm,
    /// Hex-encoded compressed public key used as node identity
    NodePubkey,
}

/// Derivation scheme: BIP32 purpose, coin type and address encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub purpose: u32,
    pub coin_type: u32,
    pub kind: AddressKind,
}

impl Derivation {
    /// BIP32 path for the given account index
    ///
    /// Node keys use a fully hardened three-level path; every other scheme
    /// follows the BIP44 layout with the index on the external chain.
    pub fn path(&self, index: u32) -> String {
        match self.kind {
            AddressKind::NodePubkey => {
                format!("m/{}'/{}'/{}'", self.purpose, self.coin_type, index)
            }
            _ => format!("m/{}'/{}'/0'/0/{}", self.purpose, self.coin_type, index),
        }
    }
}

/// Static capabilities of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub network: Network,
    pub ticker: &'static str,
    pub decimals: u8,
    pub family: NetworkFamily,
    pub derivation: Derivation,
    pub is_testnet: bool,
    /// EIP-155 chain id, EVM networks only
    pub chain_id: Option<u64>,
}

const EVM_DERIVATION: Derivation = Derivation {
    purpose: 44,
    coin_type: 60,
    kind: AddressKind::Evm,
};

impl Network {
    /// Every known network, in declaration order
    pub const ALL: [Network; 10] = [
        Network::Bitcoin,
        Network::Sepolia,
        Network::Rootstock,
        Network::Botanix,
        Network::Strata,
        Network::Citrea,
        Network::Ark,
        Network::Breez,
        Network::BreezTest,
        Network::Spark,
    ];

    /// Networks offered to the user. Sepolia is kept for development only.
    pub fn available() -> Vec<Network> {
        Self::ALL
            .into_iter()
            .filter(|n| *n != Network::Sepolia)
            .collect()
    }

    /// Wire identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::Sepolia => "sepolia",
            Network::Rootstock => "rootstock",
            Network::Botanix => "botanix",
            Network::Strata => "strata",
            Network::Citrea => "citrea",
            Network::Ark => "ark",
            Network::Breez => "breez",
            Network::BreezTest => "breeztest",
            Network::Spark => "spark",
        }
    }

    /// Capability table entry
    pub fn info(&self) -> NetworkInfo {
        let (ticker, decimals, family, derivation, is_testnet, chain_id) = match self {
            Network::Bitcoin => (
                "BTC",
                8,
                NetworkFamily::Bitcoin,
                Derivation {
                    purpose: 84,
                    coin_type: 0,
                    kind: AddressKind::SegwitV0,
                },
                false,
                None,
            ),
            Network::Sepolia => ("ETH", 18, NetworkFamily::Evm, EVM_DERIVATION, true, Some(11155111)),
            Network::Rootstock => ("RBTC", 18, NetworkFamily::Evm, EVM_DERIVATION, false, Some(30)),
            Network::Botanix => ("BTC", 18, NetworkFamily::Evm, EVM_DERIVATION, true, Some(3636)),
            Network::Strata => ("BTC", 18, NetworkFamily::Evm, EVM_DERIVATION, true, Some(12345)),
            Network::Citrea => ("cBTC", 18, NetworkFamily::Evm, EVM_DERIVATION, true, Some(5115)),
            Network::Ark => (
                "BTC",
                8,
                NetworkFamily::Ark,
                Derivation {
                    purpose: 86,
                    coin_type: 1,
                    kind: AddressKind::Taproot,
                },
                true,
                None,
            ),
            Network::Breez => (
                "BTC",
                8,
                NetworkFamily::Lightning,
                Derivation {
                    purpose: 1017,
                    coin_type: 0,
                    kind: AddressKind::NodePubkey,
                },
                false,
                None,
            ),
            Network::BreezTest => (
                "BTC",
                8,
                NetworkFamily::Lightning,
                Derivation {
                    purpose: 1017,
                    coin_type: 1,
                    kind: AddressKind::NodePubkey,
                },
                true,
                None,
            ),
            Network::Spark => (
                "BTC",
                8,
                NetworkFamily::Spark,
                Derivation {
                    purpose: 8797555,
                    coin_type: 0,
                    kind: AddressKind::NodePubkey,
                },
                false,
                None,
            ),
        };

        NetworkInfo {
            network: *self,
            ticker,
            decimals,
            family,
            derivation,
            is_testnet,
            chain_id,
        }
    }

    /// Ticker of the native coin
    pub fn ticker(&self) -> &'static str {
        self.info().ticker
    }

    /// Decimals of the native coin
    pub fn decimals(&self) -> u8 {
        self.info().decimals
    }

    /// Whether the network's coins carry no fiat value
    pub fn is_testnet(&self) -> bool {
        self.info().is_testnet
    }

    /// Whether the network speaks Ethereum JSON-RPC
    pub fn is_evm(&self) -> bool {
        self.info().family == NetworkFamily::Evm
    }

    /// EIP-155 chain id, if any
    pub fn chain_id(&self) -> Option<u64> {
        self.info().chain_id
    }

    /// Bitcoin address network used for segwit/taproot encoding and BIP32 version bytes
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Bitcoin | Network::Breez | Network::Spark => bitcoin::Network::Bitcoin,
            Network::Ark => bitcoin::Network::Signet,
            _ => bitcoin::Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| Error::UnsupportedNetwork(s.to_string()))
    }
}
