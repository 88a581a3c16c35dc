//! Key Vault
//!
//! The mnemonic only ever touches storage as an [`EncryptedMnemonic`]:
//! Argon2id stretches the password into a 256-bit key and ChaCha20-Poly1305
//! seals the phrase. Unlocking keeps the stretched key in memory; the phrase
//! itself is decrypted for the duration of a single derivation or signing
//! operation and wiped right after. Concurrent operations serialize on the
//! vault's session lock, so at most one plaintext copy exists at a time.

use crate::keys::{self, AccountKey};
use crate::network::Network;
use crate::storage::{KeyValueStore, STORAGE_KEY_MNEMONIC};
use crate::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Current blob format version
pub const VAULT_VERSION: u32 = 1;

/// Salt length used when sealing
pub const SALT_LEN: usize = 16;

const NONCE_LEN: usize = 12;
const MIN_SALT_LEN: usize = 8;

/// Argon2id cost parameters, persisted alongside the ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl KdfParams {
    /// 64 MiB, 3 passes, 4 lanes
    pub fn interactive() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }

    /// Minimal cost, for tests and constrained devices
    pub fn light() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Stretch a password into a 32-byte key
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    if salt.len() < MIN_SALT_LEN {
        return Err(Error::InvalidParams(format!(
            "salt must be at least {} bytes",
            MIN_SALT_LEN
        )));
    }

    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| Error::InvalidConfig(format!("Invalid Argon2 parameters: {}", e)))?,
    );

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

/// Encrypted mnemonic blob, the only persisted form of the secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMnemonic {
    /// Format version
    pub version: u32,
    /// Argon2id parameters used for this blob
    pub kdf: KdfParams,
    /// Argon2 salt (base64)
    pub salt: String,
    /// ChaCha20-Poly1305 nonce (hex)
    pub iv: String,
    /// Sealed phrase with authentication tag (base64)
    pub ciphertext: String,
}

/// Encrypt `plaintext` under `password` with an explicit salt
pub fn encrypt(
    plaintext: &str,
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<EncryptedMnemonic> {
    let key = derive_key(password, salt, params)?;
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();

    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|_| Error::Encryption("Failed to create cipher".into()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|_| Error::Encryption("Encryption failed".into()))?;

    Ok(EncryptedMnemonic {
        version: VAULT_VERSION,
        kdf: *params,
        salt: STANDARD.encode(salt),
        iv: hex::encode(nonce_bytes),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Decrypt a blob produced by [`encrypt`]
pub fn decrypt(blob: &EncryptedMnemonic, password: &str) -> Result<Zeroizing<String>> {
    blob.decrypt(password)
}

impl EncryptedMnemonic {
    /// Encrypt with a fresh random salt
    pub fn seal(plaintext: &str, password: &str, params: &KdfParams) -> Result<Self> {
        let salt: [u8; SALT_LEN] = rand::random();
        encrypt(plaintext, password, &salt, params)
    }

    /// Stretch `password` with this blob's salt and parameters
    pub fn derive_key(&self, password: &str) -> Result<Zeroizing<[u8; 32]>> {
        let salt = STANDARD
            .decode(&self.salt)
            .map_err(|_| Error::Deserialization("Invalid salt encoding".into()))?;
        derive_key(password, &salt, &self.kdf)
    }

    /// Decrypt with a password
    pub fn decrypt(&self, password: &str) -> Result<Zeroizing<String>> {
        let key = self.derive_key(password)?;
        self.decrypt_with_key(&key)
    }

    /// Decrypt with an already stretched key
    pub fn decrypt_with_key(&self, key: &[u8; 32]) -> Result<Zeroizing<String>> {
        if self.version != VAULT_VERSION {
            return Err(Error::Deserialization(format!(
                "Unsupported vault version: {} (expected {})",
                self.version, VAULT_VERSION
            )));
        }

        let nonce_bytes = hex::decode(&self.iv)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(Error::Deserialization("Invalid nonce length".into()));
        }
        let ciphertext = STANDARD
            .decode(&self.ciphertext)
            .map_err(|_| Error::Deserialization("Invalid ciphertext encoding".into()))?;

        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::Encryption("Failed to create cipher".into()))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
                .map_err(|_| Error::WrongPassword)?,
        );

        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| Error::Deserialization("Invalid mnemonic encoding".into()))
    }
}

/// Stretched key plus the blob it opens
struct UnlockedSession {
    key: Zeroizing<[u8; 32]>,
    blob: EncryptedMnemonic,
}

/// Holder of the wallet secret
pub struct KeyVault {
    store: Arc<dyn KeyValueStore>,
    kdf: KdfParams,
    session: Mutex<Option<UnlockedSession>>,
    addresses: DashMap<(Network, u32), String>,
}

impl KeyVault {
    /// Create a vault over `store`, sealing new blobs with `kdf`
    pub fn new(store: Arc<dyn KeyValueStore>, kdf: KdfParams) -> Self {
        Self {
            store,
            kdf,
            session: Mutex::new(None),
            addresses: DashMap::new(),
        }
    }

    /// Whether an encrypted mnemonic is persisted
    pub async fn has_encrypted_mnemonic(&self) -> Result<bool> {
        self.store.contains(STORAGE_KEY_MNEMONIC).await
    }

    /// Whether the vault is unlocked and can derive keys
    pub async fn has_mnemonic(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn load_blob(&self) -> Result<EncryptedMnemonic> {
        let raw = self
            .store
            .get_item(STORAGE_KEY_MNEMONIC)
            .await?
            .ok_or(Error::NoMnemonic)?;
        serde_json::from_str(&raw).map_err(|e| Error::Deserialization(e.to_string()))
    }

    async fn stretch(blob: EncryptedMnemonic, password: Zeroizing<String>) -> Result<UnlockedSession> {
        tokio::task::spawn_blocking(move || {
            let key = blob.derive_key(&password)?;
            blob.decrypt_with_key(&key)?;
            Ok(UnlockedSession { key, blob })
        })
        .await
        .map_err(|e| Error::Internal(format!("Key derivation task failed: {}", e)))?
    }

    async fn persist_new(&self, phrase: &str, password: &str) -> Result<()> {
        let kdf = self.kdf;
        let phrase = Zeroizing::new(phrase.to_string());
        let password = Zeroizing::new(password.to_string());

        let session = tokio::task::spawn_blocking(move || {
            let blob = EncryptedMnemonic::seal(&phrase, &password, &kdf)?;
            let key = blob.derive_key(&password)?;
            Ok::<_, Error>(UnlockedSession { key, blob })
        })
        .await
        .map_err(|e| Error::Internal(format!("Encryption task failed: {}", e)))??;

        let json = serde_json::to_string(&session.blob)?;
        self.store.set_item(STORAGE_KEY_MNEMONIC, &json).await?;

        self.addresses.clear();
        *self.session.lock().await = Some(session);
        Ok(())
    }

    /// Generate a new mnemonic, seal and persist it, and leave the vault unlocked.
    ///
    /// The phrase is returned once so the user can back it up.
    pub async fn create(&self, password: &str) -> Result<Zeroizing<String>> {
        if self.has_encrypted_mnemonic().await? {
            return Err(Error::MnemonicExists);
        }

        let phrase = keys::generate_mnemonic()?;
        self.persist_new(&phrase, password).await?;
        info!("Created new wallet mnemonic");
        Ok(phrase)
    }

    /// Import an existing mnemonic
    pub async fn import(&self, phrase: &str, password: &str) -> Result<()> {
        if self.has_encrypted_mnemonic().await? {
            return Err(Error::MnemonicExists);
        }

        keys::validate_mnemonic(phrase)?;
        let normalized = Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "));
        self.persist_new(&normalized, password).await?;
        info!("Imported wallet mnemonic");
        Ok(())
    }

    /// Unlock with the user's password
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let blob = self.load_blob().await?;
        let session = Self::stretch(blob, Zeroizing::new(password.to_string())).await?;
        *self.session.lock().await = Some(session);
        debug!("Vault unlocked");
        Ok(())
    }

    /// Discard the in-memory key
    pub async fn lock(&self) {
        *self.session.lock().await = None;
        self.addresses.clear();
        debug!("Vault locked");
    }

    /// Re-encrypt the mnemonic under a new password
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let blob = self.load_blob().await?;
        let kdf = self.kdf;
        let old_password = Zeroizing::new(old_password.to_string());
        let new_password = Zeroizing::new(new_password.to_string());

        let session = tokio::task::spawn_blocking(move || {
            let phrase = blob.decrypt(&old_password)?;
            let blob = EncryptedMnemonic::seal(&phrase, &new_password, &kdf)?;
            let key = blob.derive_key(&new_password)?;
            Ok::<_, Error>(UnlockedSession { key, blob })
        })
        .await
        .map_err(|e| Error::Internal(format!("Re-encryption task failed: {}", e)))??;

        let json = serde_json::to_string(&session.blob)?;
        self.store.set_item(STORAGE_KEY_MNEMONIC, &json).await?;

        let mut current = self.session.lock().await;
        if current.is_some() {
            *current = Some(session);
        }
        info!("Wallet password changed");
        Ok(())
    }

    /// Delete the encrypted mnemonic and forget every derived value
    pub async fn wipe(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        *session = None;
        self.addresses.clear();
        self.store.remove_item(STORAGE_KEY_MNEMONIC).await?;
        info!("Wallet mnemonic wiped");
        Ok(())
    }

    /// Run `f` with the derived key of `(network, index)`.
    ///
    /// The phrase and seed live only inside this call.
    pub async fn with_account_key<T>(
        &self,
        network: Network,
        index: u32,
        f: impl FnOnce(&AccountKey) -> Result<T>,
    ) -> Result<T> {
        let guard = self.session.lock().await;
        let session = match guard.as_ref() {
            Some(session) => session,
            None => return Err(self.not_ready().await),
        };

        let key = {
            let phrase = session.blob.decrypt_with_key(&session.key)?;
            let seed = keys::mnemonic_to_seed(&phrase)?;
            keys::derive_account_key(seed.as_ref(), network, index)?
        };

        self.addresses
            .insert((network, index), key.address().to_string());
        f(&key)
    }

    /// Address of `(network, index)`
    pub async fn address(&self, network: Network, index: u32) -> Result<String> {
        let cached = self
            .addresses
            .get(&(network, index))
            .map(|entry| entry.value().clone());

        match cached {
            Some(address) if self.has_mnemonic().await => Ok(address),
            _ => {
                self.with_account_key(network, index, |key| Ok(key.address().to_string()))
                    .await
            }
        }
    }

    async fn not_ready(&self) -> Error {
        match self.has_encrypted_mnemonic().await {
            Ok(true) => Error::Locked,
            Ok(false) => Error::NoMnemonic,
            Err(e) => e,
        }
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("kdf", &self.kdf)
            .field("cached_addresses", &self.addresses.len())
            .finish()
    }
}
