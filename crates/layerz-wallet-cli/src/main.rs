//! LayerzWallet CLI
//!
//! Onboarding, account queries and the background service launcher.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::WalletConfig;
use layerz_wallet_core::{ExchangeRates, FileStore, Network, ProviderRegistry, SwapRegistry};
use layerz_wallet_relay::{BackgroundExecutor, BridgeServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "layerz-wallet")]
#[command(about = "LayerzWallet background service", version)]
struct Cli {
    /// Config file (default: ~/.layerz-wallet/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Password {
    /// Wallet password
    #[arg(short, long, env = "LAYERZ_WALLET_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct AccountArgs {
    /// Network (defaults to the selected one)
    #[arg(short, long)]
    network: Option<Network>,

    /// Account index (defaults to the selected one)
    #[arg(short, long)]
    account: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new mnemonic and store it encrypted
    Create {
        #[command(flatten)]
        password: Password,
    },

    /// Import an existing mnemonic
    Import {
        /// BIP39 phrase
        #[arg(short, long, env = "LAYERZ_WALLET_MNEMONIC", hide_env_values = true)]
        mnemonic: String,

        #[command(flatten)]
        password: Password,
    },

    /// Show the address of an account
    Address {
        #[command(flatten)]
        account: AccountArgs,

        #[command(flatten)]
        password: Password,
    },

    /// Show the native balance of an account
    Balance {
        #[command(flatten)]
        account: AccountArgs,

        #[command(flatten)]
        password: Password,
    },

    /// List supported networks
    Networks,

    /// List swap providers and destinations from a network
    SwapPairs {
        /// Source network
        #[arg(short, long, default_value = "bitcoin")]
        network: Network,
    },

    /// Re-encrypt the mnemonic under a new password
    ChangePassword {
        /// Current password
        #[arg(long)]
        old: String,

        /// New password
        #[arg(long)]
        new: String,
    },

    /// Erase the mnemonic, whitelist and settings
    Wipe {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Run the background service and bridge server
    Serve {
        /// Listen address, overriding the config file
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Unlock on start
        #[arg(short, long, env = "LAYERZ_WALLET_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = WalletConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    match cli.command {
        Commands::Create { password } => {
            let executor = open(&config).await?;
            let phrase = executor.create_mnemonic(&password.password).await?;
            println!("Write down your recovery phrase. It will not be shown again:\n");
            println!("{}", phrase.as_str());
        }
        Commands::Import { mnemonic, password } => {
            let executor = open(&config).await?;
            executor.import_mnemonic(&mnemonic, &password.password).await?;
            println!("Mnemonic imported");
        }
        Commands::Address { account, password } => {
            let executor = open_unlocked(&config, &password.password).await?;
            let (network, index) = resolve(&executor, &account).await;
            println!("{}", executor.get_address(network, index).await?);
        }
        Commands::Balance { account, password } => {
            let executor = open_unlocked(&config, &password.password).await?;
            let (network, index) = resolve(&executor, &account).await;
            let balance = executor.get_balance(network, index).await?;
            println!("{} {}", balance.formatted, balance.symbol);
        }
        Commands::Networks => show_networks(),
        Commands::SwapPairs { network } => {
            let executor = open(&config).await?;
            show_swap_pairs(&executor, network);
        }
        Commands::ChangePassword { old, new } => {
            let executor = open(&config).await?;
            executor.change_password(&old, &new).await?;
            println!("Password changed");
        }
        Commands::Wipe { yes } => {
            if !yes {
                anyhow::bail!("refusing to wipe without --yes");
            }
            let executor = open(&config).await?;
            executor.wipe().await?;
            println!("Wallet wiped");
        }
        Commands::Serve { listen, password } => {
            let executor = open(&config).await?;
            if let Some(password) = password {
                executor.unlock(&password).await?;
            }
            let addr = listen.unwrap_or(config.listen);
            BridgeServer::new(executor, config.server_config())
                .serve(addr)
                .await?;
        }
    }

    Ok(())
}

/// Build the executor over the configured data directory
async fn open(config: &WalletConfig) -> Result<Arc<BackgroundExecutor>> {
    let data_dir = config.data_dir()?;
    let store = FileStore::new(&data_dir)
        .with_context(|| format!("opening data directory {}", data_dir.display()))?;
    info!(data_dir = %data_dir.display(), "Opened wallet store");

    let providers = ProviderRegistry::from_endpoints(&config.provider_endpoints())?;
    let rates = ExchangeRates::new(
        config.rates_url.clone(),
        Duration::from_secs(config.timeouts.transport_secs),
    )?;

    Ok(BackgroundExecutor::new(
        config.executor_config(),
        Arc::new(store),
        providers,
        SwapRegistry::with_defaults(),
        rates,
    )
    .await?)
}

async fn open_unlocked(config: &WalletConfig, password: &str) -> Result<Arc<BackgroundExecutor>> {
    let executor = open(config).await?;
    executor.unlock(password).await?;
    Ok(executor)
}

async fn resolve(executor: &BackgroundExecutor, account: &AccountArgs) -> (Network, u32) {
    let session = executor.session_state().await;
    (
        account.network.unwrap_or(session.network),
        account.account.unwrap_or(session.account_index),
    )
}

fn show_networks() {
    println!("LayerzWallet v{}\n", layerz_wallet_core::VERSION);
    println!("{:<12} {:<6} {:<10} {:<8} CHAIN ID", "NETWORK", "TICKER", "FAMILY", "TESTNET");
    for network in Network::available() {
        let info = network.info();
        let chain_id = info
            .chain_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<6} {:<10} {:<8} {}",
            network.as_str(),
            info.ticker,
            format!("{:?}", info.family).to_lowercase(),
            info.is_testnet,
            chain_id
        );
    }
}

fn show_swap_pairs(executor: &BackgroundExecutor, network: Network) {
    let routes = executor.swap_providers(network);
    if routes.is_empty() {
        println!("No swap providers from {}", network);
        return;
    }
    for route in routes {
        let destinations: Vec<&str> = route.destinations.iter().map(|n| n.as_str()).collect();
        println!(
            "{} ({} bps): {} -> {}",
            route.provider,
            route.fee_basis_points,
            network,
            destinations.join(", ")
        );
    }
}
