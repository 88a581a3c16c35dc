//! Mnemonic handling and per-network key derivation
//!
//! Derivation is a pure function of `(mnemonic, network, account index)`:
//! the BIP39 seed (empty passphrase) feeds a BIP32 master key, and the path
//! and address encoding come from the network's [`Derivation`] scheme.
//!
//! [`Derivation`]: crate::network::Derivation

use crate::network::{AddressKind, Network};
use crate::{Error, Result};
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};
use zeroize::Zeroizing;

/// Number of words in generated mnemonics
pub const MNEMONIC_WORDS: usize = 12;

/// Generate a fresh English BIP39 mnemonic
pub fn generate_mnemonic() -> Result<Zeroizing<String>> {
    let entropy = Zeroizing::new(rand::random::<[u8; 16]>());
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy.as_ref())
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Check word list membership and checksum
pub fn validate_mnemonic(phrase: &str) -> Result<()> {
    parse_mnemonic(phrase).map(|_| ())
}

fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))
}

/// BIP39 seed with an empty passphrase
pub fn mnemonic_to_seed(phrase: &str) -> Result<Zeroizing<[u8; 64]>> {
    let mnemonic = parse_mnemonic(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}

/// Derive the address of `(network, index)` from a mnemonic phrase
pub fn derive_address(phrase: &str, network: Network, index: u32) -> Result<String> {
    let seed = mnemonic_to_seed(phrase)?;
    let key = derive_account_key(seed.as_ref(), network, index)?;
    Ok(key.address().to_string())
}

/// Derive the account key for `(network, index)` from a BIP39 seed
pub fn derive_account_key(seed: &[u8], network: Network, index: u32) -> Result<AccountKey> {
    let info = network.info();
    let secp = Secp256k1::new();

    let master = Xpriv::new_master(network.bitcoin_network(), seed)
        .map_err(|e| Error::Derivation(e.to_string()))?;
    let path = DerivationPath::from_str(&info.derivation.path(index))
        .map_err(|e| Error::Derivation(e.to_string()))?;
    let derived = master
        .derive_priv(&secp, &path)
        .map_err(|e| Error::Derivation(e.to_string()))?;

    let secret = derived.private_key;
    let public = PublicKey::from_secret_key(&secp, &secret);

    let address = match info.derivation.kind {
        AddressKind::SegwitV0 => {
            Address::p2wpkh(&CompressedPublicKey(public), network.bitcoin_network()).to_string()
        }
        AddressKind::Taproot => {
            let (xonly, _) = public.x_only_public_key();
            Address::p2tr(&secp, xonly, None, network.bitcoin_network()).to_string()
        }
        AddressKind::Evm => evm_address(&public.serialize_uncompressed()),
        AddressKind::NodePubkey => hex::encode(public.serialize()),
    };

    Ok(AccountKey {
        network,
        index,
        secret: Zeroizing::new(secret.secret_bytes()),
        public_key: public.serialize(),
        address,
    })
}

/// Checksummed EVM address of an uncompressed (65-byte) public key
pub fn evm_address(uncompressed: &[u8; 65]) -> String {
    let hash = keccak256(&uncompressed[1..]);
    alloy_primitives::Address::from_slice(&hash[12..]).to_checksum(None)
}

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

/// EIP-191 digest of a `personal_sign` message
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(&data)
}

/// Recoverable secp256k1 signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component (32 bytes)
    pub r: [u8; 32],
    /// S component (32 bytes)
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// `r || s || v` with `v = 27 + recovery_id`, as returned by `personal_sign`
    pub fn to_rsv_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes.push(27 + self.recovery_id);
        format!("0x{}", hex::encode(bytes))
    }
}

/// A derived account key. The secret is wiped on drop.
pub struct AccountKey {
    network: Network,
    index: u32,
    secret: Zeroizing<[u8; 32]>,
    public_key: [u8; 33],
    address: String,
}

impl AccountKey {
    pub fn network(&self) -> Network {
        self.network
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Address encoded for the key's network
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Compressed SEC1 public key
    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    /// Secret as a secp256k1 key for bitcoin signing
    pub fn secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(self.secret.as_ref()).map_err(|e| Error::Crypto(e.to_string()))
    }

    /// Sign a 32-byte prehash, producing a low-S recoverable signature
    pub fn sign_prehash(&self, hash: &[u8; 32]) -> Result<Signature> {
        let signing_key = k256::ecdsa::SigningKey::from_slice(self.secret.as_ref())
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let (sig, recovery_id) = signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(Signature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }

    /// EIP-191 `personal_sign`
    pub fn sign_personal_message(&self, message: &[u8]) -> Result<Signature> {
        self.sign_prehash(&personal_message_hash(message))
    }
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKey")
            .field("network", &self.network)
            .field("index", &self.index)
            .field("secret", &"[REDACTED]")
            .field("address", &self.address)
            .finish()
    }
}
