//! Shared fixtures: a scripted network provider and a ready executor

mod consent_flow_test;
mod correlation_test;
mod events_test;
mod permission_test;
mod ui_rpc_test;

use async_trait::async_trait;
use layerz_wallet_core::chain::{RetryPolicy, TxSummary};
use layerz_wallet_core::keys::{AccountKey, keccak256};
use layerz_wallet_core::{
    Balance, Error, ExchangeRates, KdfParams, KeyValueStore, MemoryStore, Network,
    NetworkAccountProvider, ProviderRegistry, Result, SignedTx, SwapRegistry, TxHash, TxParams,
    TxRecord, UnsignedTx,
};
use layerz_wallet_relay::{BackgroundExecutor, ConsentEvent, ExecutorConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const PASSWORD: &str = "correct horse";
pub const DAPP: &str = "https://dapp.example";
pub const RECIPIENT: &str = "0x1111111111111111111111111111111111111111";

/// Provider answering from memory, counting every call
pub struct MockProvider {
    network: Network,
    balance: u128,
    delay: Duration,
    balance_calls: AtomicUsize,
    pub broadcasts: Mutex<Vec<SignedTx>>,
}

impl MockProvider {
    pub fn new(network: Network, balance: u128) -> Self {
        Self {
            network,
            balance,
            delay: Duration::ZERO,
            balance_calls: AtomicUsize::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// Delay every balance read
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkAccountProvider for MockProvider {
    fn network(&self) -> Network {
        self.network
    }

    async fn get_balance(&self, _address: &str) -> Result<Balance> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Balance::native(self.balance, self.network))
    }

    async fn list_transactions(&self, _address: &str) -> Result<Vec<TxRecord>> {
        Ok(Vec::new())
    }

    async fn prepare_transaction(&self, params: &TxParams) -> Result<UnsignedTx> {
        Ok(UnsignedTx {
            network: self.network,
            raw_tx: params.to.as_bytes().to_vec(),
            input_values: Vec::new(),
            summary: TxSummary {
                from: params.from.clone(),
                to: params.to.clone(),
                value: params.value.to_string(),
                estimated_fee: "0".to_string(),
            },
        })
    }

    fn sign_transaction(&self, unsigned: &UnsignedTx, key: &AccountKey) -> Result<SignedTx> {
        let hash = keccak256(&unsigned.raw_tx);
        let signature = key.sign_prehash(&hash)?;
        let mut raw_tx = unsigned.raw_tx.clone();
        raw_tx.extend_from_slice(&signature.r);
        Ok(SignedTx {
            network: self.network,
            raw_tx,
            tx_hash: format!("0x{}", hex::encode(hash)),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        self.broadcasts.lock().push(signed.clone());
        Ok(TxHash::new(signed.tx_hash.clone()))
    }

    fn is_valid_address(&self, address: &str) -> bool {
        address.len() == 42 && address.starts_with("0x")
    }
}

/// Memory store whose writes fail while `set_failing(true)`
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.remove_item(key).await
    }
}

pub struct Harness {
    pub executor: Arc<BackgroundExecutor>,
    pub store: Arc<FlakyStore>,
    pub rootstock: Arc<MockProvider>,
    pub botanix: Arc<MockProvider>,
}

pub fn test_config() -> ExecutorConfig {
    ExecutorConfig::default()
        .with_kdf(KdfParams::light())
        .with_default_network(Network::Rootstock)
        .with_consent_timeout(Duration::from_millis(300))
        .with_retry(RetryPolicy::none())
}

/// Executor on Rootstock with an imported, unlocked wallet
pub async fn harness() -> Harness {
    harness_with(MockProvider::new(Network::Rootstock, 1_000), test_config()).await
}

pub async fn harness_with(rootstock: MockProvider, config: ExecutorConfig) -> Harness {
    let rootstock = Arc::new(rootstock);
    let botanix = Arc::new(MockProvider::new(Network::Botanix, 5));
    let providers = ProviderRegistry::new()
        .with_provider(rootstock.clone())
        .with_provider(botanix.clone());

    let store = Arc::new(FlakyStore::default());
    let executor = BackgroundExecutor::new(
        config,
        store.clone(),
        providers,
        SwapRegistry::with_defaults(),
        ExchangeRates::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap(),
    )
    .await
    .unwrap();
    executor.import_mnemonic(ABANDON, PASSWORD).await.unwrap();

    Harness {
        executor,
        store,
        rootstock,
        botanix,
    }
}

/// Stand-in consent UI: answers the next consent request and reports
/// whether the resulting response was delivered
pub fn consent_ui(executor: &Arc<BackgroundExecutor>, allow: bool) -> JoinHandle<bool> {
    let broker = executor.consent();
    let mut events = broker.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConsentEvent::ConsentRequested { request }) => {
                    let receipt = if allow {
                        broker.allow(request.request_id)
                    } else {
                        broker.deny(request.request_id, Some("not now".into()))
                    };
                    return receipt.delivered().await;
                }
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
}
