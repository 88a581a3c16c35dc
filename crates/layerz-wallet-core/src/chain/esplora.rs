//! # Bitcoin Provider
//!
//! On-chain Bitcoin through an Esplora REST API (blockstream.info, mempool.space).
//! Spends native segwit (P2WPKH) outputs of the account address; change returns
//! to the sender.

use super::{
    Balance, NetworkAccountProvider, NetworkEndpoints, RestClient, SignedTx, TxHash, TxParams,
    TxRecord, TxStatus, TxSummary, UnsignedTx, format_amount,
};
use crate::keys::AccountKey;
use crate::network::Network;
use crate::{Error, Result};
use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, CompressedPublicKey, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Outputs below this value are not relayed
pub const DUST_LIMIT_SATS: u64 = 546;

/// Confirmation target used for fee estimation, in blocks
const FEE_TARGET_BLOCKS: &str = "6";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for an Esplora-backed provider
#[derive(Debug, Clone)]
pub struct EsploraConfig {
    pub network: Network,
    /// Esplora API base URLs (for failover)
    pub api_urls: Vec<String>,
    /// Block explorer URL (optional)
    pub explorer_url: Option<String>,
    pub timeout: Duration,
}

impl EsploraConfig {
    pub fn new(network: Network, endpoints: NetworkEndpoints) -> Self {
        Self {
            network,
            api_urls: endpoints.urls,
            explorer_url: endpoints.explorer_url,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Esplora API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AddressInfo {
    chain_stats: TxoStats,
    mempool_stats: TxoStats,
}

#[derive(Debug, Deserialize)]
struct TxoStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

impl TxoStats {
    fn net(&self) -> i128 {
        self.funded_txo_sum as i128 - self.spent_txo_sum as i128
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Utxo {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    #[serde(default)]
    vin: Vec<EsploraVin>,
    #[serde(default)]
    vout: Vec<EsploraVout>,
    status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraVin {
    prevout: Option<EsploraVout>,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    scriptpubkey_address: Option<String>,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
    block_time: Option<i64>,
}

// ============================================================================
// Esplora Provider
// ============================================================================

/// Bitcoin network provider
#[derive(Debug, Clone)]
pub struct EsploraProvider {
    config: EsploraConfig,
    client: RestClient,
}

impl EsploraProvider {
    pub fn new(config: EsploraConfig) -> Result<Self> {
        let client = RestClient::new(config.api_urls.clone(), config.timeout)?;
        Ok(Self { config, client })
    }

    fn parse_address(&self, address: &str) -> Result<Address> {
        Address::from_str(address)
            .map_err(|e| Error::InvalidParams(format!("Invalid address {}: {}", address, e)))?
            .require_network(self.config.network.bitcoin_network())
            .map_err(|e| Error::InvalidParams(format!("Invalid address {}: {}", address, e)))
    }

    /// Fee rate in sat/vB for the default confirmation target
    pub async fn fee_rate(&self) -> Result<u64> {
        let estimates: HashMap<String, f64> = self.client.get_json("/fee-estimates").await?;
        let rate = estimates.get(FEE_TARGET_BLOCKS).copied().unwrap_or(1.0);
        Ok((rate.ceil() as u64).max(1))
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        self.client
            .get_json(&format!("/address/{}/utxo", address))
            .await
    }
}

/// Estimated virtual size of a P2WPKH spend
pub fn estimate_vsize(inputs: usize, outputs: usize) -> u64 {
    11 + 68 * inputs as u64 + 31 * outputs as u64
}

/// Coins chosen for a spend
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    inputs: Vec<(String, u32, u64)>,
    fee: u64,
    change: u64,
}

/// Largest-first coin selection. Change below the dust limit is left to the fee.
fn select_coins(mut utxos: Vec<Utxo>, amount: u64, fee_rate: u64) -> Result<Selection> {
    if amount > Amount::MAX_MONEY.to_sat() {
        return Err(Error::InvalidParams(format!(
            "Amount {} exceeds the maximum supply",
            amount
        )));
    }

    utxos.sort_by(|a, b| b.value.cmp(&a.value));

    let mut inputs = Vec::new();
    let mut total: u64 = 0;

    for utxo in utxos {
        total = total
            .checked_add(utxo.value)
            .ok_or_else(|| Error::ChainError("UTXO total overflows".into()))?;
        inputs.push((utxo.txid, utxo.vout, utxo.value));

        let fee_with_change = fee_for(inputs.len(), 2, fee_rate)?;
        let needed = needed_for(amount, fee_with_change)?;
        if total >= needed {
            let change = total - needed;
            if change >= DUST_LIMIT_SATS {
                return Ok(Selection {
                    inputs,
                    fee: fee_with_change,
                    change,
                });
            }
        }

        let fee_no_change = fee_for(inputs.len(), 1, fee_rate)?;
        if total >= needed_for(amount, fee_no_change)? {
            return Ok(Selection {
                inputs,
                fee: total - amount,
                change: 0,
            });
        }
    }

    Err(Error::ChainError(format!(
        "Insufficient funds: have {} sats, need {} plus fee",
        total, amount
    )))
}

fn fee_for(inputs: usize, outputs: usize, fee_rate: u64) -> Result<u64> {
    estimate_vsize(inputs, outputs)
        .checked_mul(fee_rate)
        .ok_or_else(|| Error::InvalidParams(format!("Fee rate {} out of range", fee_rate)))
}

fn needed_for(amount: u64, fee: u64) -> Result<u64> {
    amount
        .checked_add(fee)
        .ok_or_else(|| Error::InvalidParams("Amount plus fee out of range".into()))
}

#[async_trait]
impl NetworkAccountProvider for EsploraProvider {
    fn network(&self) -> Network {
        self.config.network
    }

    async fn get_balance(&self, address: &str) -> Result<Balance> {
        let info: AddressInfo = self
            .client
            .get_json(&format!("/address/{}", address))
            .await?;

        let total = (info.chain_stats.net() + info.mempool_stats.net()).max(0) as u128;
        Ok(Balance::native(total, self.config.network))
    }

    async fn list_transactions(&self, address: &str) -> Result<Vec<TxRecord>> {
        let txs: Vec<EsploraTx> = self
            .client
            .get_json(&format!("/address/{}/txs", address))
            .await?;

        let mine = |a: &Option<String>| a.as_deref() == Some(address);

        Ok(txs
            .into_iter()
            .map(|tx| {
                let received: i128 = tx
                    .vout
                    .iter()
                    .filter(|o| mine(&o.scriptpubkey_address))
                    .map(|o| o.value as i128)
                    .sum();
                let spent: i128 = tx
                    .vin
                    .iter()
                    .filter_map(|i| i.prevout.as_ref())
                    .filter(|o| mine(&o.scriptpubkey_address))
                    .map(|o| o.value as i128)
                    .sum();

                TxRecord {
                    hash: tx.txid,
                    amount: received - spent,
                    status: if tx.status.confirmed {
                        TxStatus::Confirmed
                    } else {
                        TxStatus::Pending
                    },
                    timestamp: tx.status.block_time,
                }
            })
            .collect())
    }

    async fn prepare_transaction(&self, params: &TxParams) -> Result<UnsignedTx> {
        let from = self.parse_address(&params.from)?;
        let to = self.parse_address(&params.to)?;

        let amount = u64::try_from(params.value)
            .map_err(|_| Error::InvalidParams("Amount exceeds u64 sats".into()))?;
        if amount < DUST_LIMIT_SATS {
            return Err(Error::InvalidParams(format!(
                "Amount {} is below the dust limit",
                amount
            )));
        }

        let fee_rate = match params.fee_rate {
            Some(rate) => u64::try_from(rate)
                .map_err(|_| Error::InvalidParams("Fee rate out of range".into()))?,
            None => self.fee_rate().await?,
        };

        let selection = select_coins(self.utxos(&params.from).await?, amount, fee_rate)?;

        let mut input = Vec::with_capacity(selection.inputs.len());
        for (txid, vout, _) in &selection.inputs {
            let txid = Txid::from_str(txid)
                .map_err(|e| Error::ChainError(format!("Invalid utxo txid: {}", e)))?;
            input.push(TxIn {
                previous_output: OutPoint { txid, vout: *vout },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            });
        }

        let mut output = vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: to.script_pubkey(),
        }];
        if selection.change > 0 {
            output.push(TxOut {
                value: Amount::from_sat(selection.change),
                script_pubkey: from.script_pubkey(),
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        Ok(UnsignedTx {
            network: self.config.network,
            raw_tx: encode::serialize(&tx),
            input_values: selection.inputs.iter().map(|(_, _, v)| *v).collect(),
            summary: TxSummary {
                from: params.from.clone(),
                to: params.to.clone(),
                value: format!("{} BTC", format_amount(amount as u128, 8)),
                estimated_fee: format!("{} BTC", format_amount(selection.fee as u128, 8)),
            },
        })
    }

    fn sign_transaction(&self, unsigned: &UnsignedTx, key: &AccountKey) -> Result<SignedTx> {
        let tx: Transaction = encode::deserialize(&unsigned.raw_tx)
            .map_err(|e| Error::Deserialization(format!("Invalid transaction: {}", e)))?;

        if tx.input.len() != unsigned.input_values.len() {
            return Err(Error::InvalidParams(
                "Input values do not match transaction inputs".into(),
            ));
        }

        let secp = Secp256k1::new();
        let secret = key.secret_key()?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        let script_pubkey = ScriptBuf::new_p2wpkh(&CompressedPublicKey(public).wpubkey_hash());

        let mut cache = SighashCache::new(tx);
        for (index, value) in unsigned.input_values.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    index,
                    &script_pubkey,
                    Amount::from_sat(*value),
                    EcdsaSighashType::All,
                )
                .map_err(|e| Error::Crypto(format!("Sighash failed: {}", e)))?;

            let signature = secp.sign_ecdsa(&Message::from_digest(sighash.to_byte_array()), &secret);
            let witness = cache
                .witness_mut(index)
                .ok_or_else(|| Error::Internal(format!("Missing input {}", index)))?;
            *witness = Witness::p2wpkh(
                &bitcoin::ecdsa::Signature {
                    signature,
                    sighash_type: EcdsaSighashType::All,
                },
                &public,
            );
        }

        let tx = cache.into_transaction();
        Ok(SignedTx {
            network: self.config.network,
            raw_tx: encode::serialize(&tx),
            tx_hash: tx.compute_txid().to_string(),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        let txid = self
            .client
            .post_text("/tx", hex::encode(&signed.raw_tx))
            .await?;
        let txid = txid.trim();

        let mut hash = TxHash::new(txid);
        if let Some(url) = self.explorer_tx_url(txid) {
            hash = hash.with_explorer_url(url);
        }
        Ok(hash)
    }

    fn is_valid_address(&self, address: &str) -> bool {
        self.parse_address(address).is_ok()
    }

    fn explorer_tx_url(&self, hash: &str) -> Option<String> {
        self.config
            .explorer_url
            .as_ref()
            .map(|url| format!("{}/tx/{}", url.trim_end_matches('/'), hash))
    }
}
