//! Fiat exchange rates with a short-lived cache

use crate::network::Network;
use crate::{Error, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default spot price API
pub const DEFAULT_RATES_URL: &str = "https://api.coinbase.com/v2/prices";

/// How long a fetched rate is served from cache
pub const RATE_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct SpotResponse {
    data: SpotPrice,
}

#[derive(Deserialize)]
struct SpotPrice {
    amount: String,
}

/// Fiat price lookups, cached per `(ticker, fiat)`
#[derive(Debug)]
pub struct ExchangeRates {
    base_url: String,
    ttl: Duration,
    client: reqwest::Client,
    cache: DashMap<(String, String), (f64, Instant)>,
}

impl ExchangeRates {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl: RATE_CACHE_TTL,
            client,
            cache: DashMap::new(),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Price of one unit of the network's coin in `fiat`.
    /// Testnet coins have no value and yield `None`.
    pub async fn get_exchange_rate(&self, network: Network, fiat: &str) -> Result<Option<f64>> {
        if network.is_testnet() {
            return Ok(None);
        }

        // Pegged coins trade at the BTC price
        let ticker = match network.ticker() {
            "RBTC" | "cBTC" => "BTC",
            other => other,
        };
        let key = (ticker.to_string(), fiat.to_ascii_uppercase());

        if let Some(entry) = self.cache.get(&key) {
            let (rate, fetched_at) = *entry.value();
            if fetched_at.elapsed() < self.ttl {
                return Ok(Some(rate));
            }
        }

        let url = format!("{}/{}-{}/spot", self.base_url, key.0, key.1);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "Rate API answered {}",
                response.status()
            )));
        }

        let body: SpotResponse = response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("Invalid rate response: {}", e)))?;
        let rate: f64 = body
            .data
            .amount
            .parse()
            .map_err(|_| Error::ProviderUnavailable(format!("Invalid rate: {}", body.data.amount)))?;

        debug!(ticker = %key.0, fiat = %key.1, rate, "Fetched exchange rate");
        self.cache.insert(key, (rate, Instant::now()));
        Ok(Some(rate))
    }
}
