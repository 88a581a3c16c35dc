//! Background executor
//!
//! The only context that holds wallet secrets. It owns the Key Vault,
//! Permission Store, network providers, swap registry and rate cache, and
//! serves two surfaces:
//!
//! - page methods (`eth_requestAccounts`, `personal_sign`, ...) arriving
//!   through a [`ContentScriptRelay`](crate::ContentScriptRelay), gated by the
//!   permission store and the consent broker
//! - privileged UI operations (`unlock`, `getBalance`, `whitelistDapp`, ...)
//!   called by trusted wallet screens
//!
//! Selection changes (network, account, lock state) are pushed to every
//! permitted page before any response that depends on the new state.

use crate::consent::{ConsentBroker, ConsentReply};
use crate::envelope::{Envelope, ProviderEvent, RpcError, RpcResult};
use crate::events::{EventHub, PortId, PortMessage};
use layerz_wallet_core::chain::{RetryPolicy, TxStatus, retry_idempotent};
use layerz_wallet_core::storage::{
    ALL_KEYS, STORAGE_ACCEPTED_TOS, STORAGE_SELECTED_ACCOUNT_NUMBER, STORAGE_SELECTED_NETWORK,
};
use layerz_wallet_core::swap::SwapProgress;
use layerz_wallet_core::{
    Balance, Error, ExchangeRates, KdfParams, KeyValueStore, KeyVault, Network, NetworkInfo,
    Origin, Permission, PermissionStore, ProviderRegistry, Result, SwapQuote, SwapRegistry,
    TxHash, TxParams, TxRecord,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Page methods that wait for the user
pub const CONSENT_METHODS: [&str; 3] = ["eth_requestAccounts", "eth_sendTransaction", "personal_sign"];

/// Whether `method` may block on a consent decision
pub fn requires_consent(method: &str) -> bool {
    CONSENT_METHODS.contains(&method)
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound on provider reads and broadcasts
    pub data_timeout: Duration,
    /// Bound on waiting for a consent decision
    pub consent_timeout: Duration,
    /// Backoff for idempotent reads
    pub retry: RetryPolicy,
    /// Network selected when nothing is persisted
    pub default_network: Network,
    /// Argon2id cost for newly sealed mnemonics
    pub kdf: KdfParams,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            data_timeout: Duration::from_secs(10),
            consent_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            default_network: Network::Bitcoin,
            kdf: KdfParams::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_network(mut self, network: Network) -> Self {
        self.default_network = network;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

/// Active network and account, persisted under the selection keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub network: Network,
    pub account_index: u32,
}

/// Swap provider offered from a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRoute {
    pub provider: String,
    pub fee_basis_points: u32,
    pub destinations: Vec<Network>,
}

/// `chainChanged` payload: hex chain id, or the network id off-EVM
pub fn chain_tag(network: Network) -> String {
    match network.chain_id() {
        Some(id) => format!("{:#x}", id),
        None => network.as_str().to_string(),
    }
}

type Ack = Option<oneshot::Sender<()>>;

/// The privileged background context
pub struct BackgroundExecutor {
    config: ExecutorConfig,
    store: Arc<dyn KeyValueStore>,
    vault: KeyVault,
    permissions: PermissionStore,
    providers: ProviderRegistry,
    swaps: SwapRegistry,
    rates: ExchangeRates,
    consent: Arc<ConsentBroker>,
    events: EventHub,
    session: RwLock<SessionState>,
}

impl BackgroundExecutor {
    /// Build an executor over `store`, restoring the persisted selection and whitelist
    pub async fn new(
        config: ExecutorConfig,
        store: Arc<dyn KeyValueStore>,
        providers: ProviderRegistry,
        swaps: SwapRegistry,
        rates: ExchangeRates,
    ) -> Result<Arc<Self>> {
        let permissions = PermissionStore::load(store.clone()).await?;

        let network = store
            .get_item(STORAGE_SELECTED_NETWORK)
            .await?
            .and_then(|raw| raw.parse::<Network>().ok())
            .unwrap_or(config.default_network);
        let account_index = store
            .get_item(STORAGE_SELECTED_ACCOUNT_NUMBER)
            .await?
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0);
        let session = SessionState {
            network,
            account_index,
        };
        info!(%network, account_index, networks = ?providers.networks(), "Background executor ready");

        Ok(Arc::new(Self {
            vault: KeyVault::new(store.clone(), config.kdf),
            config,
            store,
            permissions,
            providers,
            swaps,
            rates,
            consent: Arc::new(ConsentBroker::new()),
            events: EventHub::new(),
            session: RwLock::new(session),
        }))
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Broker the consent UI talks to
    pub fn consent(&self) -> Arc<ConsentBroker> {
        self.consent.clone()
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    // ========================================================================
    // Page connections
    // ========================================================================

    /// Attach a page context for `origin`
    pub fn connect(
        &self,
        origin: Origin,
    ) -> (PortId, tokio::sync::mpsc::UnboundedReceiver<PortMessage>) {
        self.events.subscribe(origin)
    }

    /// Detach a page context
    pub fn disconnect(&self, port: PortId) {
        self.events.unsubscribe(port);
    }

    /// Accept a request envelope from `port` and answer on the same port.
    ///
    /// Returns immediately; the response is queued when the call completes.
    pub fn handle_page_request(self: &Arc<Self>, port: PortId, envelope: Envelope) {
        let Some(origin) = self.events.origin_of(port) else {
            debug!(%port, id = %envelope.id, "Request from detached port dropped");
            return;
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let id = envelope.id;
            let (result, ack) = match envelope.method() {
                Ok(method) => {
                    let method = method.to_string();
                    this.dispatch_page(&origin, &method, envelope.params()).await
                }
                Err(e) => (Err(e.to_rpc_error()), None),
            };

            if !this.events.send(port, PortMessage::Response { id, result, ack }) {
                debug!(%port, id = %id, "Page gone before response");
            }
        });
    }

    /// Run a page method for `origin`
    pub async fn dispatch_page(&self, origin: &Origin, method: &str, params: Value) -> (RpcResult, Ack) {
        debug!(%origin, method, "Page request");

        let outcome = match method {
            "eth_requestAccounts" => self.request_accounts(origin, &params).await,
            "eth_sendTransaction" => self.page_send_transaction(origin, &params).await,
            "personal_sign" => self.page_personal_sign(origin, &params).await,
            other => (self.page_read(origin, other).await, None),
        };

        if let (Err(e), _) = &outcome {
            warn!(%origin, method, code = e.code, error = %e.message, "Page request failed");
        }
        outcome
    }

    async fn page_read(&self, origin: &Origin, method: &str) -> RpcResult {
        let session = self.session_state().await;
        let result = match method {
            "eth_accounts" => self.visible_accounts(origin).await,
            "eth_chainId" => session
                .network
                .chain_id()
                .map(|id| json!(format!("{:#x}", id)))
                .ok_or_else(|| Error::UnsupportedNetwork(session.network.to_string())),
            "net_version" => session
                .network
                .chain_id()
                .map(|id| json!(id.to_string()))
                .ok_or_else(|| Error::UnsupportedNetwork(session.network.to_string())),
            "wallet_getNetwork" => Ok(json!(session.network)),
            "eth_getBalance" => self.page_balance(origin, session).await,
            "wallet_revokePermissions" => self.revoke_origin(origin).await.map(|_| Value::Null),
            other => Err(Error::UnsupportedMethod(other.to_string())),
        };
        result.map_err(RpcError::from)
    }

    fn require_permission(&self, origin: &Origin, network: Network) -> Result<()> {
        if self.permissions.allows(origin, network) {
            Ok(())
        } else {
            Err(Error::NotWhitelisted(origin.to_string()))
        }
    }

    /// `[address]` of the active account, if `origin` may see it
    async fn visible_accounts(&self, origin: &Origin) -> Result<Value> {
        let session = self.session_state().await;
        self.require_permission(origin, session.network)?;

        let address = self
            .vault
            .address(session.network, session.account_index)
            .await?;

        // A revoke may have landed while deriving
        self.require_permission(origin, session.network)?;
        Ok(json!([address]))
    }

    async fn ask_consent(&self, origin: &Origin, method: &str, params: &Value) -> ConsentReply {
        self.consent
            .request_consent(origin, method, params.clone(), self.config.consent_timeout)
            .await
    }

    async fn request_accounts(&self, origin: &Origin, params: &Value) -> (RpcResult, Ack) {
        let network = self.session_state().await.network;
        let mut ack = None;

        if !self.permissions.allows(origin, network) {
            let reply = self.ask_consent(origin, "eth_requestAccounts", params).await;
            let allowed = reply.is_allowed();
            ack = reply.ack;
            if !allowed {
                return (Err(RpcError::user_rejected()), ack);
            }
            if let Err(e) = self.permissions.whitelist(origin).await {
                return (Err(e.into()), ack);
            }
            info!(%origin, "Origin whitelisted after consent");
        }

        (self.visible_accounts(origin).await.map_err(RpcError::from), ack)
    }

    async fn page_balance(&self, origin: &Origin, session: SessionState) -> Result<Value> {
        self.require_permission(origin, session.network)?;
        let balance = self.get_balance(session.network, session.account_index).await?;
        self.require_permission(origin, session.network)?;
        Ok(json!(format!("{:#x}", balance.raw_value())))
    }

    async fn page_send_transaction(&self, origin: &Origin, params: &Value) -> (RpcResult, Ack) {
        let session = self.session_state().await;
        if let Err(e) = self.require_permission(origin, session.network) {
            return (Err(e.into()), None);
        }
        let tx_params = match self.page_tx_params(session, params).await {
            Ok(tx) => tx,
            Err(e) => return (Err(e.into()), None),
        };

        let reply = self.ask_consent(origin, "eth_sendTransaction", params).await;
        if !reply.is_allowed() {
            return (Err(RpcError::user_rejected()), reply.ack);
        }

        let result = async {
            self.require_permission(origin, session.network)?;
            let hash = self.send_transaction(session.network, tx_params).await?;
            Ok::<_, Error>(json!(hash.hash))
        }
        .await;
        (result.map_err(RpcError::from), reply.ack)
    }

    async fn page_tx_params(&self, session: SessionState, params: &Value) -> Result<TxParams> {
        #[derive(Deserialize)]
        struct PageTx {
            from: Option<String>,
            to: String,
            value: Option<String>,
            data: Option<String>,
            gas: Option<String>,
        }

        let tx: PageTx = params
            .get(0)
            .cloned()
            .ok_or_else(|| Error::InvalidParams("missing transaction object".into()))
            .and_then(|v| serde_json::from_value(v).map_err(|e| Error::InvalidParams(e.to_string())))?;

        let from = self
            .vault
            .address(session.network, session.account_index)
            .await?;
        if let Some(requested) = &tx.from
            && !requested.eq_ignore_ascii_case(&from)
        {
            return Err(Error::InvalidParams(format!("from {} is not the active account", requested)));
        }

        let value = tx.value.as_deref().map(parse_quantity).transpose()?.unwrap_or(0);
        let mut params = TxParams::new(from, tx.to, value);
        if let Some(data) = tx.data.as_deref() {
            let bytes = hex::decode(data.trim_start_matches("0x"))
                .map_err(|e| Error::InvalidParams(format!("data: {}", e)))?;
            params = params.with_data(bytes);
        }
        if let Some(gas) = tx.gas.as_deref() {
            let gas = u64::try_from(parse_quantity(gas)?)
                .map_err(|_| Error::InvalidParams("gas out of range".into()))?;
            params = params.with_gas_limit(gas);
        }
        Ok(params)
    }

    async fn page_personal_sign(&self, origin: &Origin, params: &Value) -> (RpcResult, Ack) {
        let session = self.session_state().await;
        if let Err(e) = self.require_permission(origin, session.network) {
            return (Err(e.into()), None);
        }

        let Some(message) = params.get(0).and_then(Value::as_str) else {
            return (Err(Error::InvalidParams("missing message".into()).into()), None);
        };
        let message = decode_message(message);

        if let Some(requested) = params.get(1).and_then(Value::as_str) {
            match self.vault.address(session.network, session.account_index).await {
                Ok(active) if active.eq_ignore_ascii_case(requested) => {}
                Ok(_) => {
                    let e = Error::InvalidParams(format!("{} is not the active account", requested));
                    return (Err(e.into()), None);
                }
                Err(e) => return (Err(e.into()), None),
            }
        }

        let reply = self.ask_consent(origin, "personal_sign", params).await;
        if !reply.is_allowed() {
            return (Err(RpcError::user_rejected()), reply.ack);
        }

        let result = async {
            self.require_permission(origin, session.network)?;
            let signature = self
                .vault
                .with_account_key(session.network, session.account_index, |key| {
                    key.sign_personal_message(&message)
                })
                .await?;
            Ok::<_, Error>(json!(signature.to_rsv_hex()))
        }
        .await;
        (result.map_err(RpcError::from), reply.ack)
    }

    async fn revoke_origin(&self, origin: &Origin) -> Result<bool> {
        let revoked = self.permissions.revoke(origin).await?;
        if revoked {
            self.events
                .emit_to_origin(origin, &ProviderEvent::AccountsChanged(Vec::new()));
        }
        Ok(revoked)
    }

    // ========================================================================
    // Privileged operations
    // ========================================================================

    /// Whether the vault is unlocked
    pub async fn has_mnemonic(&self) -> bool {
        self.vault.has_mnemonic().await
    }

    pub async fn has_encrypted_mnemonic(&self) -> Result<bool> {
        self.vault.has_encrypted_mnemonic().await
    }

    pub async fn has_accepted_terms_of_service(&self) -> Result<bool> {
        Ok(self.store.get_item(STORAGE_ACCEPTED_TOS).await?.as_deref() == Some("true"))
    }

    pub async fn accept_terms_of_service(&self) -> Result<()> {
        self.store.set_item(STORAGE_ACCEPTED_TOS, "true").await
    }

    /// Generate, seal and persist a new mnemonic. The phrase is returned once.
    pub async fn create_mnemonic(&self, password: &str) -> Result<Zeroizing<String>> {
        let phrase = self.vault.create(password).await?;
        self.publish_accounts().await;
        Ok(phrase)
    }

    pub async fn import_mnemonic(&self, phrase: &str, password: &str) -> Result<()> {
        self.vault.import(phrase, password).await?;
        self.publish_accounts().await;
        Ok(())
    }

    pub async fn unlock(&self, password: &str) -> Result<()> {
        self.vault.unlock(password).await?;
        info!("Wallet unlocked");
        self.publish_accounts().await;
        Ok(())
    }

    pub async fn lock(&self) {
        let _session = self.session.read().await;
        self.vault.lock().await;
        info!("Wallet locked");
        self.events.emit_where(&ProviderEvent::AccountsChanged(Vec::new()), |o| {
            self.permissions.is_whitelisted(o)
        });
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.vault.change_password(old_password, new_password).await
    }

    /// Forget the mnemonic, whitelist, selection and ToS acceptance
    pub async fn wipe(&self) -> Result<()> {
        let mut session = self.session.write().await;
        self.vault.wipe().await?;
        self.permissions.clear().await?;
        for key in ALL_KEYS {
            self.store.remove_item(key).await?;
        }
        *session = SessionState {
            network: self.config.default_network,
            account_index: 0,
        };

        // Every page loses access; none is whitelisted any more
        self.events
            .emit_where(&ProviderEvent::AccountsChanged(Vec::new()), |_| true);
        warn!("Wallet wiped");
        Ok(())
    }

    pub async fn session_state(&self) -> SessionState {
        *self.session.read().await
    }

    /// Switch the active network and notify permitted pages
    pub async fn select_network(&self, network: Network) -> Result<SessionState> {
        self.providers.get(network)?;

        let mut session = self.session.write().await;
        self.store
            .set_item(STORAGE_SELECTED_NETWORK, network.as_str())
            .await?;
        session.network = network;
        let state = *session;

        self.events.emit_where(
            &ProviderEvent::ChainChanged(chain_tag(network)),
            |o| self.permissions.is_whitelisted(o),
        );
        self.emit_accounts(state).await;
        info!(%network, "Network selected");
        Ok(state)
    }

    /// Switch the active account and notify permitted pages
    pub async fn select_account(&self, account_index: u32) -> Result<SessionState> {
        let mut session = self.session.write().await;
        self.store
            .set_item(STORAGE_SELECTED_ACCOUNT_NUMBER, &account_index.to_string())
            .await?;
        session.account_index = account_index;
        let state = *session;

        self.emit_accounts(state).await;
        info!(account_index, "Account selected");
        Ok(state)
    }

    async fn publish_accounts(&self) {
        let session = self.session.read().await;
        self.emit_accounts(*session).await;
    }

    /// Must run while the session lock is held so no dependent response
    /// overtakes the events.
    async fn emit_accounts(&self, state: SessionState) {
        let accounts = match self.vault.address(state.network, state.account_index).await {
            Ok(address) => vec![address],
            Err(Error::Locked | Error::NoMnemonic) => Vec::new(),
            Err(e) => {
                warn!(network = %state.network, error = %e, "Account address unavailable");
                Vec::new()
            }
        };

        self.events.emit_where(&ProviderEvent::AccountsChanged(accounts), |o| {
            self.permissions.allows(o, state.network)
        });
        // Grants restricted to other networks see nothing here
        self.events.emit_where(&ProviderEvent::AccountsChanged(Vec::new()), |o| {
            self.permissions.is_whitelisted(o) && !self.permissions.allows(o, state.network)
        });
    }

    pub async fn get_address(&self, network: Network, account_index: u32) -> Result<String> {
        self.vault.address(network, account_index).await
    }

    /// Native balance; transport failures are retried
    pub async fn get_balance(&self, network: Network, account_index: u32) -> Result<Balance> {
        let provider = self.providers.get(network)?;
        let address = self.vault.address(network, account_index).await?;

        self.bounded("balance", async {
            retry_idempotent(self.config.retry, || provider.get_balance(&address)).await
        })
        .await
    }

    pub async fn list_transactions(&self, network: Network, account_index: u32) -> Result<Vec<TxRecord>> {
        let provider = self.providers.get(network)?;
        let address = self.vault.address(network, account_index).await?;

        self.bounded("transaction history", async {
            retry_idempotent(self.config.retry, || provider.list_transactions(&address)).await
        })
        .await
    }

    /// Prepare, sign with the active account's key, and broadcast.
    ///
    /// Never retried: a broadcast may have landed even if the answer was lost.
    pub async fn send_transaction(&self, network: Network, params: TxParams) -> Result<TxHash> {
        let provider = self.providers.get(network)?;
        if !provider.is_valid_address(&params.to) {
            return Err(Error::InvalidParams(format!("Invalid recipient: {}", params.to)));
        }

        let account_index = self.account_for(network, &params.from).await?;
        let unsigned = self
            .bounded("transaction preparation", provider.prepare_transaction(&params))
            .await?;
        let signed = self
            .vault
            .with_account_key(network, account_index, |key| {
                provider.sign_transaction(&unsigned, key)
            })
            .await?;
        let hash = self
            .bounded("broadcast", provider.broadcast(&signed))
            .await?;

        info!(%network, tx_hash = %hash.hash, "Transaction broadcast");
        Ok(hash)
    }

    /// Index of the account owning `from` on `network`; the active index is
    /// tried first
    async fn account_for(&self, network: Network, from: &str) -> Result<u32> {
        let active = self.session_state().await.account_index;
        if self.vault.address(network, active).await?.eq_ignore_ascii_case(from) {
            return Ok(active);
        }
        Err(Error::InvalidParams(format!("{} is not the active account", from)))
    }

    pub async fn whitelist_dapp(&self, origin: &str) -> Result<Permission> {
        let origin = Origin::parse(origin)?;
        let permission = self.permissions.whitelist(&origin).await?;
        info!(%origin, "Origin whitelisted");
        Ok(permission)
    }

    pub async fn is_whitelisted(&self, origin: &str) -> Result<bool> {
        Ok(self.permissions.is_whitelisted(&Origin::parse(origin)?))
    }

    /// Revoke an origin; its pages immediately see no accounts
    pub async fn revoke_dapp(&self, origin: &str) -> Result<bool> {
        let origin = Origin::parse(origin)?;
        let revoked = self.revoke_origin(&origin).await?;
        info!(%origin, revoked, "Origin revoked");
        Ok(revoked)
    }

    pub fn list_whitelist(&self) -> Vec<Permission> {
        self.permissions.list()
    }

    /// Spot price; transport failures are retried
    pub async fn get_exchange_rate(&self, network: Network, fiat: &str) -> Result<Option<f64>> {
        self.bounded("exchange rate", async {
            retry_idempotent(self.config.retry, || self.rates.get_exchange_rate(network, fiat)).await
        })
        .await
    }

    pub fn swap_providers(&self, network: Network) -> Vec<SwapRoute> {
        self.swaps
            .providers_from(network)
            .into_iter()
            .map(|provider| SwapRoute {
                provider: provider.name().to_string(),
                fee_basis_points: provider.fee_basis_points(),
                destinations: provider
                    .pairs()
                    .iter()
                    .filter(|pair| pair.from == network)
                    .map(|pair| pair.to)
                    .collect(),
            })
            .collect()
    }

    pub async fn swap(&self, from: Network, to: Network, amount: u128, destination: &str) -> Result<String> {
        let progress = |event: SwapProgress| debug!(?event, "Swap progress");
        self.bounded("swap", self.swaps.swap(from, &progress, to, amount, destination))
            .await
    }

    pub fn swap_quote(&self, from: Network, to: Network, amount: u128) -> Result<SwapQuote> {
        self.swaps.quote(from, to, amount)
    }

    pub fn available_networks(&self) -> Vec<Network> {
        Network::available()
    }

    pub fn network_info(&self, network: Network) -> NetworkInfo {
        network.info()
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.config.data_timeout, fut)
            .await
            .map_err(|_| {
                Error::ProviderUnavailable(format!(
                    "{} timed out after {:?}",
                    what, self.config.data_timeout
                ))
            })?
    }

    // ========================================================================
    // UI RPC
    // ========================================================================

    /// Dispatch a privileged operation by its UI method name
    pub async fn handle_ui_request(&self, method: &str, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Password {
            password: String,
        }

        #[derive(Deserialize)]
        struct Import {
            mnemonic: String,
            password: String,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ChangePassword {
            old_password: String,
            new_password: String,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Account {
            network: Option<Network>,
            account_index: Option<u32>,
        }

        #[derive(Deserialize)]
        struct SelectNetwork {
            network: Network,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SelectAccount {
            account_index: u32,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Send {
            network: Option<Network>,
            tx_params: TxParams,
        }

        #[derive(Deserialize)]
        struct OriginParam {
            origin: String,
        }

        #[derive(Deserialize)]
        struct Rate {
            network: Option<Network>,
            fiat: String,
        }

        #[derive(Deserialize)]
        struct Swap {
            from: Network,
            to: Network,
            amount: String,
            destination: Option<String>,
        }

        debug!(method, "UI request");
        let session = self.session_state().await;
        let account = |params: Value| -> Result<(Network, u32)> {
            let a: Account = parse_params(params)?;
            Ok((
                a.network.unwrap_or(session.network),
                a.account_index.unwrap_or(session.account_index),
            ))
        };

        let value = match method {
            "hasMnemonic" => json!(self.has_mnemonic().await),
            "hasEncryptedMnemonic" => json!(self.has_encrypted_mnemonic().await?),
            "hasAcceptedTermsOfService" => json!(self.has_accepted_terms_of_service().await?),
            "acceptTermsOfService" => {
                self.accept_terms_of_service().await?;
                Value::Null
            }
            "createMnemonic" => {
                let p: Password = parse_params(params)?;
                let phrase = self.create_mnemonic(&p.password).await?;
                json!({ "mnemonic": phrase.as_str() })
            }
            "importMnemonic" => {
                let p: Import = parse_params(params)?;
                self.import_mnemonic(&p.mnemonic, &p.password).await?;
                Value::Null
            }
            "unlock" => {
                let p: Password = parse_params(params)?;
                self.unlock(&p.password).await?;
                Value::Null
            }
            "lock" => {
                self.lock().await;
                Value::Null
            }
            "changePassword" => {
                let p: ChangePassword = parse_params(params)?;
                self.change_password(&p.old_password, &p.new_password).await?;
                Value::Null
            }
            "wipe" => {
                self.wipe().await?;
                Value::Null
            }
            "sessionState" => serde_json::to_value(session)?,
            "selectNetwork" => {
                let p: SelectNetwork = parse_params(params)?;
                serde_json::to_value(self.select_network(p.network).await?)?
            }
            "selectAccount" => {
                let p: SelectAccount = parse_params(params)?;
                serde_json::to_value(self.select_account(p.account_index).await?)?
            }
            "getAddress" => {
                let (network, index) = account(params)?;
                json!(self.get_address(network, index).await?)
            }
            "getBalance" => {
                let (network, index) = account(params)?;
                serde_json::to_value(self.get_balance(network, index).await?)?
            }
            "listTransactions" => {
                let (network, index) = account(params)?;
                let records = self.list_transactions(network, index).await?;
                let pending = records.iter().filter(|r| r.status == TxStatus::Pending).count();
                debug!(%network, total = records.len(), pending, "Listed transactions");
                serde_json::to_value(records)?
            }
            "sendTransaction" => {
                let p: Send = parse_params(params)?;
                let network = p.network.unwrap_or(session.network);
                serde_json::to_value(self.send_transaction(network, p.tx_params).await?)?
            }
            "whitelistDapp" => {
                let p: OriginParam = parse_params(params)?;
                serde_json::to_value(self.whitelist_dapp(&p.origin).await?)?
            }
            "isWhitelisted" => {
                let p: OriginParam = parse_params(params)?;
                json!(self.is_whitelisted(&p.origin).await?)
            }
            "revokeDapp" => {
                let p: OriginParam = parse_params(params)?;
                json!(self.revoke_dapp(&p.origin).await?)
            }
            "listWhitelist" => serde_json::to_value(self.list_whitelist())?,
            "getExchangeRate" => {
                let p: Rate = parse_params(params)?;
                let network = p.network.unwrap_or(session.network);
                json!(self.get_exchange_rate(network, &p.fiat).await?)
            }
            "swapProviders" => {
                let p: SelectNetwork = parse_params(params)?;
                serde_json::to_value(self.swap_providers(p.network))?
            }
            "swap" => {
                let p: Swap = parse_params(params)?;
                let amount = parse_amount_param(&p.amount)?;
                let destination = match p.destination {
                    Some(destination) => destination,
                    None => self.get_address(p.to, session.account_index).await?,
                };
                json!(self.swap(p.from, p.to, amount, &destination).await?)
            }
            "swapQuote" => {
                let p: Swap = parse_params(params)?;
                let amount = parse_amount_param(&p.amount)?;
                serde_json::to_value(self.swap_quote(p.from, p.to, amount)?)?
            }
            "availableNetworks" => serde_json::to_value(self.available_networks())?,
            "networkInfo" => {
                let p: SelectNetwork = parse_params(params)?;
                serde_json::to_value(self.network_info(p.network))?
            }
            "pendingConsents" => serde_json::to_value(self.consent.pending())?,
            other => return Err(Error::UnsupportedMethod(other.to_string())),
        };
        Ok(value)
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    // Parameterless calls may send nothing at all
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn parse_amount_param(raw: &str) -> Result<u128> {
    raw.parse::<u128>()
        .map_err(|_| Error::InvalidParams(format!("Invalid amount: {}", raw)))
}

/// `0x`-prefixed hex or decimal quantity
fn parse_quantity(raw: &str) -> Result<u128> {
    let parsed = match raw.strip_prefix("0x") {
        Some("") => Ok(0),
        Some(digits) => u128::from_str_radix(digits, 16),
        None => raw.parse::<u128>(),
    };
    parsed.map_err(|_| Error::InvalidParams(format!("Invalid quantity: {}", raw)))
}

/// `personal_sign` message: hex bytes if it decodes as such, UTF-8 otherwise
fn decode_message(raw: &str) -> Vec<u8> {
    raw.strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .unwrap_or_else(|| raw.as_bytes().to_vec())
}
