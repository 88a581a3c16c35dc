//! `layerz-wallet` configuration file
//!
//! Every field is optional; a missing file means defaults.
//!
//! ```toml
//! data_dir = "/var/lib/layerz-wallet"
//! listen = "127.0.0.1:7420"
//! default_network = "rootstock"
//!
//! [timeouts]
//! consent_secs = 60
//!
//! [endpoints.rootstock]
//! urls = ["https://rsk.example/rpc"]
//! ```

use anyhow::{Context, Result};
use layerz_wallet_core::chain::NetworkEndpoints;
use layerz_wallet_core::rates::DEFAULT_RATES_URL;
use layerz_wallet_core::{Network, ProviderEndpoints};
use layerz_wallet_relay::{ExecutorConfig, RelayConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = ".layerz-wallet";
const CONFIG_FILE: &str = "config.toml";

/// Settings loaded from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Where the encrypted mnemonic and settings live
    pub data_dir: Option<PathBuf>,
    /// Bridge server address
    pub listen: SocketAddr,
    /// Network selected on first start
    pub default_network: Network,
    /// Exchange rate API base URL
    pub rates_url: String,
    /// Allow cross-origin requests to the bridge
    pub cors: bool,
    pub timeouts: TimeoutConfig,
    /// Per-network endpoint overrides, merged over the public defaults
    pub endpoints: HashMap<Network, NetworkEndpoints>,
}

/// Timeouts in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Provider transport requests
    pub transport_secs: u64,
    /// Executor-side bound on balance, history and broadcast calls
    pub data_secs: u64,
    /// How long the user has to answer a consent request
    pub consent_secs: u64,
    /// Relay-side bound on calls that never wait for the user
    pub request_secs: u64,
    /// How long the consent UI waits for a delivery acknowledgement
    pub delivery_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            transport_secs: 10,
            data_secs: 10,
            consent_secs: 120,
            request_secs: 30,
            delivery_secs: 5,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            listen: SocketAddr::from(([127, 0, 0, 1], 7420)),
            default_network: Network::Bitcoin,
            rates_url: DEFAULT_RATES_URL.to_string(),
            cors: true,
            timeouts: TimeoutConfig::default(),
            endpoints: HashMap::new(),
        }
    }
}

/// `~/.layerz-wallet`
pub fn app_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(APP_DIR))
        .context("cannot determine home directory")
}

impl WalletConfig {
    /// Load `path`, or the default location if none is given. Only an
    /// explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (app_dir()?.join(CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file {} not found", path.display());
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => app_dir(),
        }
    }

    /// Public endpoints with this file's overrides applied
    pub fn provider_endpoints(&self) -> ProviderEndpoints {
        self.endpoints.iter().fold(
            ProviderEndpoints::default().with_request_timeout(self.timeouts.transport_secs),
            |endpoints, (network, overrides)| endpoints.with_network(*network, overrides.clone()),
        )
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_default_network(self.default_network)
            .with_data_timeout(Duration::from_secs(self.timeouts.data_secs))
            .with_consent_timeout(Duration::from_secs(self.timeouts.consent_secs))
    }

    pub fn server_config(&self) -> ServerConfig {
        // The relay outlives the executor's consent window so the page sees
        // the rejection rather than a relay timeout
        let relay = RelayConfig::default()
            .with_request_timeout(Duration::from_secs(self.timeouts.request_secs))
            .with_consent_timeout(Duration::from_secs(self.timeouts.consent_secs + 5));

        let config = ServerConfig::default()
            .with_request_timeout(self.timeouts.request_secs)
            .with_delivery_timeout(self.timeouts.delivery_secs)
            .with_relay_config(relay);
        if self.cors { config } else { config.without_cors() }
    }
}
