//! SDK bridge provider for `breez`, `breeztest`, `spark` and `ark`.
//!
//! These networks are driven by vendor SDKs that run in a sidecar process.
//! The sidecar speaks JSON-RPC; payment requests are authenticated by a
//! signature from the account key over the SHA-256 of the request body.

use super::{
    Balance, NetworkAccountProvider, RpcClient, SignedTx, TxHash, TxParams, TxRecord, TxStatus,
    TxSummary, UnsignedTx, format_amount,
};
use crate::keys::AccountKey;
use crate::network::{Network, NetworkFamily};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SdkBridgeConfig {
    pub network: Network,
    /// Bridge URLs (for failover)
    pub urls: Vec<String>,
    pub timeout: Duration,
}

impl SdkBridgeConfig {
    pub fn new(network: Network, urls: Vec<String>) -> Self {
        Self {
            network,
            urls,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Payment request sent to the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub network: Network,
    pub from: String,
    /// Invoice, node id or address, depending on the network
    pub destination: String,
    pub amount_sat: u64,
}

/// Payment request with the sender's authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayment {
    pub request: PaymentRequest,
    /// `r || s || v` hex
    pub signature: String,
    /// Compressed public key hex
    pub pubkey: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    balance_sat: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentEntry {
    id: String,
    amount_sat: i64,
    status: String,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    payment_id: String,
}

/// Provider backed by the SDK bridge sidecar
#[derive(Debug, Clone)]
pub struct SdkBridgeProvider {
    config: SdkBridgeConfig,
    rpc: RpcClient,
}

impl SdkBridgeProvider {
    pub fn new(config: SdkBridgeConfig) -> Result<Self> {
        match config.network.info().family {
            NetworkFamily::Lightning | NetworkFamily::Spark | NetworkFamily::Ark => {}
            _ => {
                return Err(Error::UnsupportedNetwork(format!(
                    "{} is not served by the SDK bridge",
                    config.network
                )));
            }
        }
        let rpc = RpcClient::new(config.urls.clone(), config.timeout)?;
        Ok(Self { config, rpc })
    }

    fn params(&self, address: &str) -> serde_json::Value {
        serde_json::json!({
            "network": self.config.network,
            "address": address,
        })
    }
}

/// SHA-256 digest of a request body
fn request_digest(raw: &[u8]) -> [u8; 32] {
    Sha256::digest(raw).into()
}

fn is_lightning_destination(destination: &str) -> bool {
    let lower = destination.to_ascii_lowercase();
    lower.starts_with("lnbc")
        || lower.starts_with("lntb")
        || lower.starts_with("lntbs")
        || lower.starts_with("lnbcrt")
        || lower.starts_with("lnurl")
        || is_node_pubkey(destination)
}

fn is_node_pubkey(destination: &str) -> bool {
    destination.len() == 66
        && (destination.starts_with("02") || destination.starts_with("03"))
        && hex::decode(destination).is_ok()
}

#[async_trait]
impl NetworkAccountProvider for SdkBridgeProvider {
    fn network(&self) -> Network {
        self.config.network
    }

    async fn get_balance(&self, address: &str) -> Result<Balance> {
        let response: BalanceResponse = self
            .rpc
            .request("wallet_getBalance", self.params(address))
            .await?;
        Ok(Balance::native(
            response.balance_sat as u128,
            self.config.network,
        ))
    }

    async fn list_transactions(&self, address: &str) -> Result<Vec<TxRecord>> {
        let payments: Vec<PaymentEntry> = self
            .rpc
            .request("wallet_listPayments", self.params(address))
            .await?;

        Ok(payments
            .into_iter()
            .map(|p| TxRecord {
                hash: p.id,
                amount: p.amount_sat as i128,
                status: match p.status.as_str() {
                    "complete" | "completed" | "succeeded" => TxStatus::Confirmed,
                    "failed" => TxStatus::Failed,
                    _ => TxStatus::Pending,
                },
                timestamp: p.timestamp,
            })
            .collect())
    }

    async fn prepare_transaction(&self, params: &TxParams) -> Result<UnsignedTx> {
        if !self.is_valid_address(&params.to) {
            return Err(Error::InvalidParams(format!(
                "Invalid {} destination: {}",
                self.config.network, params.to
            )));
        }

        let amount_sat = u64::try_from(params.value)
            .map_err(|_| Error::InvalidParams("Amount exceeds u64 sats".into()))?;

        let request = PaymentRequest {
            network: self.config.network,
            from: params.from.clone(),
            destination: params.to.clone(),
            amount_sat,
        };

        Ok(UnsignedTx {
            network: self.config.network,
            raw_tx: serde_json::to_vec(&request)?,
            input_values: Vec::new(),
            summary: TxSummary {
                from: params.from.clone(),
                to: params.to.clone(),
                value: format!("{} BTC", format_amount(amount_sat as u128, 8)),
                // Routing fees are settled by the SDK
                estimated_fee: "0 BTC".to_string(),
            },
        })
    }

    fn sign_transaction(&self, unsigned: &UnsignedTx, key: &AccountKey) -> Result<SignedTx> {
        let request: PaymentRequest = serde_json::from_slice(&unsigned.raw_tx)
            .map_err(|e| Error::Deserialization(format!("Invalid payment request: {}", e)))?;

        let digest = request_digest(&unsigned.raw_tx);
        let signature = key.sign_prehash(&digest)?;

        let payment = SignedPayment {
            request,
            signature: signature.to_rsv_hex(),
            pubkey: hex::encode(key.public_key()),
        };

        Ok(SignedTx {
            network: self.config.network,
            raw_tx: serde_json::to_vec(&payment)?,
            tx_hash: hex::encode(digest),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        let payment: SignedPayment = serde_json::from_slice(&signed.raw_tx)
            .map_err(|e| Error::Deserialization(format!("Invalid signed payment: {}", e)))?;

        let response: SendResponse = self
            .rpc
            .request("wallet_sendPayment", serde_json::to_value(&payment)?)
            .await?;

        Ok(TxHash::new(response.payment_id))
    }

    fn is_valid_address(&self, address: &str) -> bool {
        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return false;
        }

        let lower = address.to_ascii_lowercase();
        match self.config.network {
            Network::Breez | Network::BreezTest => is_lightning_destination(address),
            Network::Spark => {
                lower.starts_with("sp1") || lower.starts_with("spark1") || is_lightning_destination(address)
            }
            Network::Ark => {
                lower.starts_with("ark1")
                    || lower.starts_with("tark1")
                    || lower.starts_with("tb1")
                    || lower.starts_with("bc1")
            }
            _ => false,
        }
    }
}
