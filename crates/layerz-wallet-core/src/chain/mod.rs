//! # Network Account Providers
//!
//! Each supported network is served by an adapter implementing
//! [`NetworkAccountProvider`]: address derivation, balance and history
//! lookups, transaction preparation, signing and broadcast.
//!
//! ## Adapters
//!
//! - **EVM** - `sepolia`, `rootstock`, `botanix`, `strata`, `citrea` over Ethereum JSON-RPC
//! - **Bitcoin** - `bitcoin` over an Esplora REST API
//! - **SDK bridge** - `breez`, `breeztest`, `spark`, `ark` through a JSON-RPC sidecar
//!   hosting the network SDK
//!
//! Transport failures surface as [`Error::ProviderUnavailable`]; node-side
//! rejections surface as [`Error::ChainError`]. Reads may be wrapped in
//! [`retry_idempotent`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use layerz_wallet_core::chain::{ProviderEndpoints, ProviderRegistry};
//! use layerz_wallet_core::Network;
//!
//! let providers = ProviderRegistry::from_endpoints(&ProviderEndpoints::default())?;
//! let balance = providers.get(Network::Rootstock)?.get_balance("0x...").await?;
//! ```

pub mod esplora;
pub mod evm;
pub mod sdk;

use crate::keys::{self, AccountKey};
use crate::network::{Network, NetworkFamily};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use esplora::{EsploraConfig, EsploraProvider};
pub use evm::{EvmConfig, EvmProvider};
pub use sdk::{SdkBridgeConfig, SdkBridgeProvider};

// ============================================================================
// Core Types
// ============================================================================

/// Balance representation for any network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Raw balance in the smallest unit (sats, wei)
    pub raw: String,
    /// Human-readable balance with decimals
    pub formatted: String,
    /// Ticker of the native coin
    pub symbol: String,
    /// Number of decimals
    pub decimals: u8,
}

impl Balance {
    /// Create a new balance
    pub fn new(raw: u128, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            formatted: format_amount(raw, decimals),
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Balance in the network's native coin
    pub fn native(raw: u128, network: Network) -> Self {
        Self::new(raw, network.decimals(), network.ticker())
    }

    /// Raw value as an integer
    pub fn raw_value(&self) -> u128 {
        self.raw.parse().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.raw_value() == 0
    }
}

/// Format a raw amount with decimals, trimming trailing zeros
pub fn format_amount(raw: u128, decimals: u8) -> String {
    if raw == 0 {
        return "0".to_string();
    }

    let divisor = 10u128.pow(decimals as u32);
    let whole = raw / divisor;
    let fraction = raw % divisor;

    if fraction == 0 {
        whole.to_string()
    } else {
        let fraction_str = format!("{:0>width$}", fraction, width = decimals as usize);
        format!("{}.{}", whole, fraction_str.trim_end_matches('0'))
    }
}

/// Parse a human-readable amount ("0.015") into smallest units
pub fn parse_amount(value: &str, decimals: u8) -> Result<u128> {
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };

    if fraction.len() > decimals as usize {
        return Err(Error::InvalidParams(format!("Too many decimal places: {}", value)));
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| Error::InvalidParams(format!("Invalid amount: {}", value)))?
    };

    let fraction_value: u128 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<width$}", fraction, width = decimals as usize)
            .parse()
            .map_err(|_| Error::InvalidParams(format!("Invalid amount: {}", value)))?
    };

    whole
        .checked_mul(10u128.pow(decimals as u32))
        .and_then(|v| v.checked_add(fraction_value))
        .ok_or_else(|| Error::InvalidParams("Amount overflow".into()))
}

/// Parameters for building a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    /// Sender address
    pub from: String,
    /// Recipient address, invoice or node id
    pub to: String,
    /// Amount in smallest units
    pub value: u128,
    /// Contract call data (EVM only)
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    /// Gas limit override (EVM)
    #[serde(default)]
    pub gas_limit: Option<u64>,
    /// Nonce override (EVM)
    #[serde(default)]
    pub nonce: Option<u64>,
    /// Fee rate override: wei per gas (EVM) or sat/vB (Bitcoin)
    #[serde(default)]
    pub fee_rate: Option<u128>,
}

impl TxParams {
    /// Create new transaction parameters
    pub fn new(from: impl Into<String>, to: impl Into<String>, value: u128) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            value,
            data: None,
            gas_limit: None,
            nonce: None,
            fee_rate: None,
        }
    }

    /// Add contract call data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Set gas limit
    pub fn with_gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// Set nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set fee rate
    pub fn with_fee_rate(mut self, rate: u128) -> Self {
        self.fee_rate = Some(rate);
        self
    }
}

/// Transaction prepared by a provider, ready for signing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedTx {
    pub network: Network,
    /// Serialized transaction (provider-specific format)
    pub raw_tx: Vec<u8>,
    /// Values of spent outputs, in input order (Bitcoin only)
    #[serde(default)]
    pub input_values: Vec<u64>,
    /// Human-readable summary
    pub summary: TxSummary,
}

/// Human-readable transaction summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxSummary {
    pub from: String,
    pub to: String,
    pub value: String,
    pub estimated_fee: String,
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTx {
    pub network: Network,
    /// Serialized signed transaction
    pub raw_tx: Vec<u8>,
    /// Transaction hash (pre-computed)
    pub tx_hash: String,
}

/// Transaction hash returned after broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHash {
    /// The transaction hash or payment id
    pub hash: String,
    /// Explorer URL (if available)
    pub explorer_url: Option<String>,
}

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            explorer_url: None,
        }
    }

    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Pending,
    Failed,
}

/// Entry in an account's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    /// Net effect on the account in smallest units; negative for outgoing
    pub amount: i128,
    pub status: TxStatus,
    /// Unix timestamp, if confirmed
    pub timestamp: Option<i64>,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Per-network account adapter
///
/// This trait abstracts each network's derivation, confirmation and broadcast
/// semantics so the executor can treat every network alike.
#[async_trait]
pub trait NetworkAccountProvider: Send + Sync {
    /// Network served by this provider
    fn network(&self) -> Network;

    /// Derive the account address for `index` from a BIP39 seed
    fn derive_address(&self, seed: &[u8], index: u32) -> Result<String> {
        keys::derive_account_key(seed, self.network(), index).map(|key| key.address().to_string())
    }

    /// Native balance of `address`
    async fn get_balance(&self, address: &str) -> Result<Balance>;

    /// Recent transactions touching `address`, newest first
    async fn list_transactions(&self, address: &str) -> Result<Vec<TxRecord>>;

    /// Build an unsigned transaction
    async fn prepare_transaction(&self, params: &TxParams) -> Result<UnsignedTx>;

    /// Sign a prepared transaction with the sender's key
    fn sign_transaction(&self, unsigned: &UnsignedTx, key: &AccountKey) -> Result<SignedTx>;

    /// Submit a signed transaction
    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash>;

    /// Check whether `address` is valid on this network
    fn is_valid_address(&self, address: &str) -> bool;

    /// Explorer URL for a transaction
    fn explorer_tx_url(&self, _hash: &str) -> Option<String> {
        None
    }
}

// ============================================================================
// Endpoint Configuration
// ============================================================================

/// Endpoints for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    /// Node or server URLs, tried in order
    pub urls: Vec<String>,
    /// Explorer API for transaction history (Blockscout-compatible)
    #[serde(default)]
    pub explorer_api: Option<String>,
    /// Explorer web URL for links
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl NetworkEndpoints {
    pub fn new(urls: Vec<&str>) -> Self {
        Self {
            urls: urls.into_iter().map(String::from).collect(),
            explorer_api: None,
            explorer_url: None,
        }
    }

    pub fn with_explorer(mut self, api: &str, web: &str) -> Self {
        self.explorer_api = Some(api.to_string());
        self.explorer_url = Some(web.to_string());
        self
    }
}

/// Endpoints for every network, with public defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default)]
    pub networks: HashMap<Network, NetworkEndpoints>,
    /// Per-request transport timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Default address of the SDK bridge sidecar
pub const DEFAULT_SDK_BRIDGE_URL: &str = "http://127.0.0.1:7410";

impl Default for ProviderEndpoints {
    fn default() -> Self {
        let mut networks = HashMap::new();
        networks.insert(
            Network::Bitcoin,
            NetworkEndpoints::new(vec!["https://blockstream.info/api", "https://mempool.space/api"])
                .with_explorer("https://mempool.space/api", "https://mempool.space"),
        );
        networks.insert(
            Network::Sepolia,
            NetworkEndpoints::new(vec!["https://rpc.sepolia.org"]).with_explorer(
                "https://eth-sepolia.blockscout.com/api",
                "https://eth-sepolia.blockscout.com",
            ),
        );
        networks.insert(
            Network::Rootstock,
            NetworkEndpoints::new(vec!["https://public-node.rsk.co"]).with_explorer(
                "https://rootstock.blockscout.com/api",
                "https://rootstock.blockscout.com",
            ),
        );
        networks.insert(
            Network::Botanix,
            NetworkEndpoints::new(vec!["https://node.botanixlabs.dev"]),
        );
        networks.insert(
            Network::Strata,
            NetworkEndpoints::new(vec!["https://rpc.testnet.alpenlabs.io"]),
        );
        networks.insert(
            Network::Citrea,
            NetworkEndpoints::new(vec!["https://rpc.testnet.citrea.xyz"]).with_explorer(
                "https://explorer.testnet.citrea.xyz/api",
                "https://explorer.testnet.citrea.xyz",
            ),
        );
        for network in [Network::Ark, Network::Breez, Network::BreezTest, Network::Spark] {
            networks.insert(network, NetworkEndpoints::new(vec![DEFAULT_SDK_BRIDGE_URL]));
        }

        Self {
            networks,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderEndpoints {
    /// Override the endpoints of one network
    pub fn with_network(mut self, network: Network, endpoints: NetworkEndpoints) -> Self {
        self.networks.insert(network, endpoints);
        self
    }

    /// Set the transport timeout
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Lookup of the provider serving each network
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Network, Arc<dyn NetworkAccountProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the default adapter for every configured network
    pub fn from_endpoints(endpoints: &ProviderEndpoints) -> Result<Self> {
        let timeout = Duration::from_secs(endpoints.request_timeout_secs);
        let mut registry = Self::new();

        for (network, config) in &endpoints.networks {
            let provider: Arc<dyn NetworkAccountProvider> = match network.info().family {
                NetworkFamily::Evm => Arc::new(EvmProvider::new(
                    EvmConfig::for_network(*network, config.clone())?.with_timeout(timeout),
                )?),
                NetworkFamily::Bitcoin => Arc::new(EsploraProvider::new(
                    EsploraConfig::new(*network, config.clone()).with_timeout(timeout),
                )?),
                NetworkFamily::Lightning | NetworkFamily::Spark | NetworkFamily::Ark => {
                    Arc::new(SdkBridgeProvider::new(
                        SdkBridgeConfig::new(*network, config.urls.clone()).with_timeout(timeout),
                    )?)
                }
            };
            registry.register(provider);
        }

        Ok(registry)
    }

    /// Register or replace a provider
    pub fn register(&mut self, provider: Arc<dyn NetworkAccountProvider>) {
        self.providers.insert(provider.network(), provider);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_provider(mut self, provider: Arc<dyn NetworkAccountProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Provider for `network`
    pub fn get(&self, network: Network) -> Result<Arc<dyn NetworkAccountProvider>> {
        self.providers
            .get(&network)
            .cloned()
            .ok_or_else(|| Error::UnsupportedNetwork(network.to_string()))
    }

    /// Networks with a provider, in declaration order
    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<Network> = self.providers.keys().copied().collect();
        networks.sort();
        networks
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("networks", &self.networks())
            .finish()
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Backoff policy for idempotent reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the first retry; doubles after each
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Single attempt
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

/// Run an idempotent read, retrying transport failures with exponential backoff.
///
/// Only use this for operations that do not mutate account state.
pub async fn retry_idempotent<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                tracing::debug!(attempt, error = %e, "Retrying idempotent read");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Transport Clients
// ============================================================================

/// Ordered list of endpoints, rotating on failure
#[derive(Debug, Clone)]
struct EndpointPool {
    urls: Vec<String>,
    current_index: Arc<AtomicUsize>,
}

impl EndpointPool {
    fn new(urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::InvalidConfig("At least one endpoint URL required".into()));
        }
        Ok(Self {
            urls: urls
                .into_iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .collect(),
            current_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn current(&self) -> &str {
        let idx = self.current_index.load(Ordering::Relaxed);
        &self.urls[idx % self.urls.len()]
    }

    fn rotate(&self) {
        self.current_index.fetch_add(1, Ordering::Relaxed);
    }

    /// Try `op` on each endpoint in turn until one answers.
    /// Node-side errors are returned immediately without failover.
    async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for _ in 0..self.urls.len() {
            let url = self.current().to_string();

            match op(url.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Request failed on {}: {}", url, e);
                    last_error = Some(e);
                    self.rotate();
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::ProviderUnavailable("All endpoints failed".into())))
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {}", e)))
}

/// HTTP JSON-RPC client with failover support
#[derive(Clone)]
pub struct RpcClient {
    pool: EndpointPool,
    client: reqwest::Client,
}

impl RpcClient {
    /// Create a new RPC client with failover URLs
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            pool: EndpointPool::new(urls)?,
            client: http_client(timeout)?,
        })
    }

    /// Make a JSON-RPC request with automatic failover
    pub async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        self.pool
            .run(|url| self.make_request(url, method, params.clone()))
            .await
    }

    async fn make_request<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self.client.post(&url).json(&request_body).send().await?;

        if response.status().is_server_error() {
            return Err(Error::ProviderUnavailable(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = response_body.get("error") {
            return Err(Error::ChainError(format!("RPC error: {}", error)));
        }

        let result = response_body
            .get("result")
            .ok_or_else(|| Error::ChainError("Missing result in RPC response".into()))?;

        serde_json::from_value(result.clone())
            .map_err(|e| Error::ChainError(format!("Failed to deserialize result: {}", e)))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("urls", &self.pool.urls)
            .field("current_index", &self.pool.current_index.load(Ordering::Relaxed))
            .finish()
    }
}

/// HTTP REST client with failover support
#[derive(Debug, Clone)]
pub struct RestClient {
    pool: EndpointPool,
    client: reqwest::Client,
}

impl RestClient {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            pool: EndpointPool::new(urls)?,
            client: http_client(timeout)?,
        })
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.pool
            .run(|base| async move {
                let response = self.client.get(format!("{}{}", base, path)).send().await?;
                let response = check_status(response).await?;
                response
                    .json()
                    .await
                    .map_err(|e| Error::ChainError(format!("Failed to parse response: {}", e)))
            })
            .await
    }

    /// POST a text body to `path` and return the text response
    pub async fn post_text(&self, path: &str, body: String) -> Result<String> {
        self.pool
            .run(|base| {
                let body = body.clone();
                async move {
                    let response = self
                        .client
                        .post(format!("{}{}", base, path))
                        .body(body)
                        .send()
                        .await?;
                    let response = check_status(response).await?;
                    Ok(response.text().await?)
                }
            })
            .await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.is_server_error() || status.as_u16() == 429 {
        Err(Error::ProviderUnavailable(format!("server answered {}", status)))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(Error::ChainError(format!("{}: {}", status, body.trim())))
    }
}
