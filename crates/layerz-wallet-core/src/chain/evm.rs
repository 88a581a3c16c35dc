//! # EVM Provider
//!
//! Adapter for the EVM networks (Rootstock, Botanix, Strata, Citrea, Sepolia):
//! - Legacy EIP-155 transactions (Rootstock has no EIP-1559 fee market)
//! - JSON-RPC with endpoint failover
//! - History through a Blockscout-compatible explorer API, when configured

use super::{
    Balance, NetworkAccountProvider, NetworkEndpoints, RestClient, RpcClient, SignedTx, TxHash,
    TxParams, TxRecord, TxStatus, TxSummary, UnsignedTx, format_amount,
};
use crate::keys::{AccountKey, Signature, keccak256};
use crate::network::Network;
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Gas limit of a plain value transfer
const TRANSFER_GAS: u64 = 21_000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for an EVM provider
#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub network: Network,
    /// EIP-155 chain id
    pub chain_id: u64,
    /// RPC endpoint URLs (for failover)
    pub rpc_urls: Vec<String>,
    /// Blockscout-compatible API base (optional)
    pub explorer_api: Option<String>,
    /// Block explorer URL (optional)
    pub explorer_url: Option<String>,
    /// Transport timeout
    pub timeout: Duration,
}

impl EvmConfig {
    /// Config for an EVM network from its endpoints
    pub fn for_network(network: Network, endpoints: NetworkEndpoints) -> Result<Self> {
        let chain_id = network
            .chain_id()
            .ok_or_else(|| Error::UnsupportedNetwork(format!("{} is not an EVM network", network)))?;

        Ok(Self {
            network,
            chain_id,
            rpc_urls: endpoints.urls,
            explorer_api: endpoints.explorer_api,
            explorer_url: endpoints.explorer_url,
            timeout: Duration::from_secs(10),
        })
    }

    /// Set transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the chain id (e.g. a private Strata devnet)
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }
}

// ============================================================================
// Legacy Transaction Type
// ============================================================================

/// Legacy transaction, RLP-encoded as the unsigned payload
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct LegacyTransaction {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
}

impl LegacyTransaction {
    /// EIP-155 signing hash: keccak(rlp([nonce, gasprice, gas, to, value, data, chainId, 0, 0]))
    fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length()
                + chain_id.length()
                + 0u8.length()
                + 0u8.length(),
        }
        .encode(&mut stream);

        self.encode_fields(&mut stream);
        chain_id.encode(&mut stream);
        0u8.encode(&mut stream);
        0u8.encode(&mut stream);

        keccak256(&stream)
    }

    /// Encode with signature, `v = recovery_id + 35 + chain_id * 2`
    fn encode_signed(&self, signature: &Signature, chain_id: u64) -> Vec<u8> {
        let v = signature.recovery_id as u64 + 35 + chain_id * 2;
        let r = U256::from_be_slice(&signature.r);
        let s = U256::from_be_slice(&signature.s);

        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length() + v.length() + r.length() + s.length(),
        }
        .encode(&mut stream);

        self.encode_fields(&mut stream);
        v.encode(&mut stream);
        r.encode(&mut stream);
        s.encode(&mut stream);

        stream.to_vec()
    }

    fn encode_fields(&self, stream: &mut alloy_rlp::BytesMut) {
        self.nonce.encode(stream);
        self.gas_price.encode(stream);
        self.gas_limit.encode(stream);
        self.to.encode(stream);
        self.value.encode(stream);
        self.data.encode(stream);
    }

    fn rlp_payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
    }
}

// ============================================================================
// EVM Provider
// ============================================================================

/// EVM network provider
#[derive(Debug, Clone)]
pub struct EvmProvider {
    config: EvmConfig,
    rpc: RpcClient,
    explorer: Option<RestClient>,
}

impl EvmProvider {
    pub fn new(config: EvmConfig) -> Result<Self> {
        let rpc = RpcClient::new(config.rpc_urls.clone(), config.timeout)?;
        let explorer = config
            .explorer_api
            .as_ref()
            .map(|api| RestClient::new(vec![api.clone()], config.timeout))
            .transpose()?;
        Ok(Self {
            config,
            rpc,
            explorer,
        })
    }

    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    /// Pending-inclusive nonce for `address`
    pub async fn get_nonce(&self, address: &str) -> Result<u64> {
        let result: String = self
            .rpc
            .request(
                "eth_getTransactionCount",
                serde_json::json!([address, "pending"]),
            )
            .await?;
        parse_hex_u64(&result)
    }

    /// Current gas price in wei
    pub async fn gas_price(&self) -> Result<u128> {
        let result: String = self
            .rpc
            .request("eth_gasPrice", serde_json::json!([]))
            .await?;
        parse_hex_u128(&result)
    }

    async fn estimate_gas(&self, params: &TxParams) -> Result<u64> {
        let tx_object = serde_json::json!({
            "from": params.from,
            "to": params.to,
            "value": format!("0x{:x}", params.value),
            "data": params.data.as_ref().map(|d| format!("0x{}", hex::encode(d))),
        });

        let result: String = self
            .rpc
            .request("eth_estimateGas", serde_json::json!([tx_object]))
            .await?;

        // 20% headroom
        parse_hex_u64(&result).map(|gas| gas.saturating_mul(6) / 5)
    }
}

#[derive(Deserialize)]
struct ExplorerTxList {
    #[serde(default)]
    result: Vec<ExplorerTx>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTx {
    hash: String,
    from: String,
    value: String,
    #[serde(default)]
    time_stamp: Option<String>,
    #[serde(default)]
    is_error: Option<String>,
    #[serde(default)]
    confirmations: Option<String>,
}

#[async_trait]
impl NetworkAccountProvider for EvmProvider {
    fn network(&self) -> Network {
        self.config.network
    }

    async fn get_balance(&self, address: &str) -> Result<Balance> {
        let result: String = self
            .rpc
            .request("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;

        Ok(Balance::native(parse_hex_u128(&result)?, self.config.network))
    }

    async fn list_transactions(&self, address: &str) -> Result<Vec<TxRecord>> {
        let Some(explorer) = &self.explorer else {
            return Ok(Vec::new());
        };

        let list: ExplorerTxList = explorer
            .get_json(&format!(
                "?module=account&action=txlist&address={}&sort=desc",
                address
            ))
            .await?;

        Ok(list
            .result
            .into_iter()
            .map(|tx| {
                let value: i128 = tx.value.parse().unwrap_or(0);
                let outgoing = tx.from.eq_ignore_ascii_case(address);
                let status = if tx.is_error.as_deref() == Some("1") {
                    TxStatus::Failed
                } else if tx.confirmations.as_deref().is_some_and(|c| c != "0") {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Pending
                };
                TxRecord {
                    hash: tx.hash,
                    amount: if outgoing { -value } else { value },
                    status,
                    timestamp: tx.time_stamp.and_then(|t| t.parse().ok()),
                }
            })
            .collect())
    }

    async fn prepare_transaction(&self, params: &TxParams) -> Result<UnsignedTx> {
        let to = Address::from_str(&params.to)
            .map_err(|e| Error::InvalidParams(format!("Invalid to address: {}", e)))?;

        let nonce = match params.nonce {
            Some(n) => n,
            None => self.get_nonce(&params.from).await?,
        };

        let gas_price = match params.fee_rate {
            Some(rate) => rate,
            None => self.gas_price().await?,
        };

        let gas_limit = match (params.gas_limit, &params.data) {
            (Some(limit), _) => limit,
            (None, None) => TRANSFER_GAS,
            (None, Some(_)) => self.estimate_gas(params).await?,
        };

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value: U256::from(params.value),
            data: params.data.clone().map(Bytes::from).unwrap_or_default(),
        };

        let mut raw = alloy_rlp::BytesMut::new();
        tx.encode(&mut raw);

        let decimals = self.config.network.decimals();
        let ticker = self.config.network.ticker();

        Ok(UnsignedTx {
            network: self.config.network,
            raw_tx: raw.to_vec(),
            input_values: Vec::new(),
            summary: TxSummary {
                from: params.from.clone(),
                to: params.to.clone(),
                value: format!("{} {}", format_amount(params.value, decimals), ticker),
                estimated_fee: format!(
                    "{} {}",
                    format_amount(gas_price.saturating_mul(gas_limit as u128), decimals),
                    ticker
                ),
            },
        })
    }

    fn sign_transaction(&self, unsigned: &UnsignedTx, key: &AccountKey) -> Result<SignedTx> {
        let tx = LegacyTransaction::decode(&mut unsigned.raw_tx.as_slice())
            .map_err(|e| Error::Deserialization(format!("Invalid transaction: {}", e)))?;

        let signature = key.sign_prehash(&tx.signing_hash(self.config.chain_id))?;
        let raw_tx = tx.encode_signed(&signature, self.config.chain_id);
        let tx_hash = format!("0x{}", hex::encode(keccak256(&raw_tx)));

        Ok(SignedTx {
            network: self.config.network,
            raw_tx,
            tx_hash,
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        let raw_hex = format!("0x{}", hex::encode(&signed.raw_tx));

        let result: String = self
            .rpc
            .request("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await?;

        let mut hash = TxHash::new(&result);
        if let Some(url) = self.explorer_tx_url(&result) {
            hash = hash.with_explorer_url(url);
        }
        Ok(hash)
    }

    fn is_valid_address(&self, address: &str) -> bool {
        address.len() == 42 && address.starts_with("0x") && Address::from_str(address).is_ok()
    }

    fn explorer_tx_url(&self, hash: &str) -> Option<String> {
        self.config
            .explorer_url
            .as_ref()
            .map(|url| format!("{}/tx/{}", url.trim_end_matches('/'), hash))
    }
}

/// Parse a `0x`-prefixed quantity
pub fn parse_hex_u128(s: &str) -> Result<u128> {
    let s = s.trim_start_matches("0x");
    if s.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(s, 16).map_err(|e| Error::ChainError(format!("Invalid hex: {}", e)))
}

fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.trim_start_matches("0x");
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 16).map_err(|e| Error::ChainError(format!("Invalid hex: {}", e)))
}
