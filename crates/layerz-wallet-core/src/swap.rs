//! # Swap Provider Registry
//!
//! Maps `(source network, destination network)` to the ordered list of swap
//! providers able to move funds across that pair. A request for a pair no
//! provider handles fails fast with [`Error::UnsupportedSwapPair`]; the UI
//! shows its message verbatim.

use crate::network::Network;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Lifetime of a quote
pub const QUOTE_TTL_SECS: i64 = 60;

/// Directed network pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapPair {
    pub from: Network,
    pub to: Network,
}

impl SwapPair {
    pub const fn new(from: Network, to: Network) -> Self {
        Self { from, to }
    }
}

/// Progress events reported while a swap is being set up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum SwapProgress {
    /// Provider accepted the pair
    Started { provider: String },
    /// Swap page is ready for the user
    UrlReady { url: String },
}

/// Callback receiving [`SwapProgress`] events
pub type ProgressCallback<'a> = &'a (dyn Fn(SwapProgress) + Send + Sync);

/// Indicative quote for a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub provider: String,
    pub from: Network,
    pub to: Network,
    /// Amount sent, in the source network's smallest unit
    pub amount: u128,
    pub fee_basis_points: u32,
    pub expires_at: DateTime<Utc>,
}

impl SwapQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A service that swaps funds between networks
#[async_trait]
pub trait SwapProvider: Send + Sync {
    /// Display name, used in error messages
    fn name(&self) -> &str;

    /// Pairs this provider handles
    fn pairs(&self) -> &[SwapPair];

    fn supports(&self, from: Network, to: Network) -> bool {
        self.pairs().contains(&SwapPair::new(from, to))
    }

    /// Provider fee in basis points
    fn fee_basis_points(&self) -> u32;

    /// Start a swap; returns the URL the user completes it at
    async fn swap(
        &self,
        from: Network,
        progress: ProgressCallback<'_>,
        to: Network,
        amount: u128,
        destination: &str,
    ) -> Result<String>;
}

// ============================================================================
// Boltz
// ============================================================================

const BOLTZ_PAIRS: [SwapPair; 3] = [
    SwapPair::new(Network::Bitcoin, Network::Rootstock),
    SwapPair::new(Network::Rootstock, Network::Bitcoin),
    SwapPair::new(Network::Breez, Network::Rootstock),
];

/// Boltz web app swaps between Bitcoin, Lightning and Rootstock
#[derive(Debug, Clone)]
pub struct SwapProviderBoltz {
    base_url: String,
}

impl Default for SwapProviderBoltz {
    fn default() -> Self {
        Self {
            base_url: "https://boltz.exchange".to_string(),
        }
    }
}

impl SwapProviderBoltz {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn asset(network: Network) -> &'static str {
        match network {
            Network::Rootstock => "RBTC",
            Network::Breez => "LN",
            _ => "BTC",
        }
    }
}

#[async_trait]
impl SwapProvider for SwapProviderBoltz {
    fn name(&self) -> &str {
        "Boltz"
    }

    fn pairs(&self) -> &[SwapPair] {
        &BOLTZ_PAIRS
    }

    fn fee_basis_points(&self) -> u32 {
        10
    }

    async fn swap(
        &self,
        from: Network,
        progress: ProgressCallback<'_>,
        to: Network,
        amount: u128,
        destination: &str,
    ) -> Result<String> {
        if !self.supports(from, to) {
            return Err(Error::UnsupportedSwapPair {
                from: from.to_string(),
                to: to.to_string(),
                provider: self.name().to_string(),
            });
        }

        progress(SwapProgress::Started {
            provider: self.name().to_string(),
        });

        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidConfig(format!("Invalid Boltz URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("sendAsset", Self::asset(from))
            .append_pair("receiveAsset", Self::asset(to))
            .append_pair("sendAmount", &amount.to_string())
            .append_pair("destination", destination);
        let url = url.to_string();

        progress(SwapProgress::UrlReady { url: url.clone() });
        Ok(url)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered swap providers per network pair
#[derive(Clone, Default)]
pub struct SwapRegistry {
    providers: Vec<Arc<dyn SwapProvider>>,
    by_pair: HashMap<SwapPair, Vec<Arc<dyn SwapProvider>>>,
}

impl SwapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SwapProviderBoltz::new()));
        registry
    }

    /// Append a provider; earlier registrations take precedence
    pub fn register(&mut self, provider: Arc<dyn SwapProvider>) {
        for pair in provider.pairs() {
            self.by_pair.entry(*pair).or_default().push(provider.clone());
        }
        self.providers.push(provider);
    }

    /// Providers handling `from -> to`, in preference order
    pub fn providers_for(&self, from: Network, to: Network) -> Vec<Arc<dyn SwapProvider>> {
        self.by_pair
            .get(&SwapPair::new(from, to))
            .cloned()
            .unwrap_or_default()
    }

    /// Providers with any pair starting at `network`
    pub fn providers_from(&self, network: Network) -> Vec<Arc<dyn SwapProvider>> {
        self.providers
            .iter()
            .filter(|p| p.pairs().iter().any(|pair| pair.from == network))
            .cloned()
            .collect()
    }

    /// Destinations reachable from `network`
    pub fn destinations_from(&self, network: Network) -> Vec<Network> {
        let mut destinations: Vec<Network> = self
            .by_pair
            .keys()
            .filter(|pair| pair.from == network)
            .map(|pair| pair.to)
            .collect();
        destinations.sort();
        destinations
    }

    fn select(&self, from: Network, to: Network) -> Result<Arc<dyn SwapProvider>> {
        self.providers_for(from, to)
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnsupportedSwapPair {
                from: from.to_string(),
                to: to.to_string(),
                provider: self.provider_names(),
            })
    }

    fn provider_names(&self) -> String {
        if self.providers.is_empty() {
            return "any provider".to_string();
        }
        self.providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Swap through the first capable provider
    pub async fn swap(
        &self,
        from: Network,
        progress: ProgressCallback<'_>,
        to: Network,
        amount: u128,
        destination: &str,
    ) -> Result<String> {
        let provider = self.select(from, to)?;
        info!(%from, %to, provider = provider.name(), "Starting swap");
        provider.swap(from, progress, to, amount, destination).await
    }

    /// Quote from the first capable provider, valid for [`QUOTE_TTL_SECS`]
    pub fn quote(&self, from: Network, to: Network, amount: u128) -> Result<SwapQuote> {
        let provider = self.select(from, to)?;
        Ok(SwapQuote {
            provider: provider.name().to_string(),
            from,
            to,
            amount,
            fee_basis_points: provider.fee_basis_points(),
            expires_at: Utc::now() + Duration::seconds(QUOTE_TTL_SECS),
        })
    }
}

impl std::fmt::Debug for SwapRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapRegistry")
            .field("providers", &self.provider_names())
            .finish()
    }
}
