//! Persistent key-value storage
//!
//! The background service persists a handful of string values: the selected
//! network and account, the encrypted mnemonic blob, the dApp whitelist and the
//! terms-of-service flag. [`KeyValueStore`] abstracts the backing medium;
//! [`MemoryStore`] serves tests and [`FileStore`] keeps one file per key.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Selected network id
pub const STORAGE_SELECTED_NETWORK: &str = "STORAGE_SELECTED_NETWORK";
/// Selected account index
pub const STORAGE_SELECTED_ACCOUNT_NUMBER: &str = "STORAGE_SELECTED_ACCOUNT_NUMBER";
/// Encrypted mnemonic blob (JSON)
pub const STORAGE_KEY_MNEMONIC: &str = "STORAGE_KEY_MNEMONIC";
/// Serialized permission records
pub const STORAGE_DAPP_WHITELIST: &str = "STORAGE_DAPP_WHITELIST";
/// Terms of service acceptance flag
pub const STORAGE_ACCEPTED_TOS: &str = "STORAGE_ACCEPTED_TOS";

/// Every key the wallet writes, in wipe order
pub const ALL_KEYS: [&str; 5] = [
    STORAGE_KEY_MNEMONIC,
    STORAGE_DAPP_WHITELIST,
    STORAGE_SELECTED_NETWORK,
    STORAGE_SELECTED_ACCOUNT_NUMBER,
    STORAGE_ACCEPTED_TOS,
];

/// Trait for string key-value storage backends
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Check whether a key is present
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

/// File-backed store, one file per key
#[derive(Debug)]
pub struct FileStore {
    /// Base directory for stored values
    base_path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_path`, creating the directory if needed
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path })
    }

    fn item_path(&self, key: &str) -> PathBuf {
        // Sanitize key to prevent path traversal
        let safe_key = key.replace(['/', '\\', '.', '~'], "_");
        self.base_path.join(format!("{}.item", safe_key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.item_path(key);

        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.item_path(key);
        tokio::fs::write(&path, value).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, perms).await?;
        }

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key);

        if path.exists() {
            // Overwrite with zeros before deleting
            let size = tokio::fs::metadata(&path).await?.len() as usize;
            tokio::fs::write(&path, vec![0u8; size]).await?;
            tokio::fs::remove_file(&path).await?;
        }

        Ok(())
    }
}
