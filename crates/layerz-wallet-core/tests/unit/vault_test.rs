//! Unit tests for the key vault

use layerz_wallet_core::storage::STORAGE_KEY_MNEMONIC;
use layerz_wallet_core::vault::{self, SALT_LEN};
use layerz_wallet_core::{EncryptedMnemonic, Error, KdfParams, KeyValueStore, KeyVault, MemoryStore, Network};
use std::sync::Arc;

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn vault() -> (KeyVault, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (KeyVault::new(store.clone(), KdfParams::light()), store)
}

// ============================================================================
// Sealing
// ============================================================================

#[test]
fn test_seal_and_open() {
    let blob = EncryptedMnemonic::seal(ABANDON, "pw", &KdfParams::light()).unwrap();
    assert_eq!(blob.version, vault::VAULT_VERSION);
    assert_eq!(blob.decrypt("pw").unwrap().as_str(), ABANDON);
    assert!(matches!(blob.decrypt("nope"), Err(Error::WrongPassword)));
}

#[test]
fn test_explicit_salt_is_recorded() {
    let salt = [9u8; SALT_LEN];
    let blob = vault::encrypt(ABANDON, "pw", &salt, &KdfParams::light()).unwrap();
    let again = vault::encrypt(ABANDON, "pw", &salt, &KdfParams::light()).unwrap();

    assert_eq!(blob.salt, again.salt);
    // Fresh nonce every time
    assert_ne!(blob.iv, again.iv);
    assert_eq!(vault::decrypt(&again, "pw").unwrap().as_str(), ABANDON);
}

#[test]
fn test_blob_never_contains_plaintext() {
    let blob = EncryptedMnemonic::seal(ABANDON, "pw", &KdfParams::light()).unwrap();
    let json = serde_json::to_string(&blob).unwrap();
    assert!(!json.contains("abandon"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_fresh_vault_reports_no_mnemonic() {
    let (vault, _) = vault();
    assert!(!vault.has_mnemonic().await);
    assert!(matches!(
        vault.address(Network::Bitcoin, 0).await,
        Err(Error::NoMnemonic)
    ));
}

#[tokio::test]
async fn test_create_then_lock_then_unlock() {
    let (vault, store) = vault();
    let phrase = vault.create("hunter2").await.unwrap();
    assert_eq!(phrase.split_whitespace().count(), 12);
    assert!(store.contains(STORAGE_KEY_MNEMONIC).await.unwrap());

    let before = vault.address(Network::Rootstock, 0).await.unwrap();

    vault.lock().await;
    assert!(matches!(
        vault.address(Network::Rootstock, 0).await,
        Err(Error::Locked)
    ));

    assert!(matches!(vault.unlock("wrong").await, Err(Error::WrongPassword)));
    vault.unlock("hunter2").await.unwrap();
    assert_eq!(vault.address(Network::Rootstock, 0).await.unwrap(), before);
}

#[tokio::test]
async fn test_second_onboarding_refused() {
    let (vault, _) = vault();
    vault.import(ABANDON, "pw").await.unwrap();
    assert!(matches!(vault.create("pw").await, Err(Error::MnemonicExists)));
    assert!(matches!(vault.import(ABANDON, "pw").await, Err(Error::MnemonicExists)));
}

#[tokio::test]
async fn test_change_password() {
    let (vault, _) = vault();
    vault.import(ABANDON, "old").await.unwrap();

    assert!(matches!(
        vault.change_password("bad", "new").await,
        Err(Error::WrongPassword)
    ));
    vault.change_password("old", "new").await.unwrap();

    vault.lock().await;
    assert!(vault.unlock("old").await.is_err());
    vault.unlock("new").await.unwrap();
    assert_eq!(
        vault.address(Network::Bitcoin, 0).await.unwrap(),
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
    );
}

#[tokio::test]
async fn test_wipe_allows_new_onboarding() {
    let (vault, store) = vault();
    vault.import(ABANDON, "pw").await.unwrap();
    vault.wipe().await.unwrap();

    assert!(!vault.has_mnemonic().await);
    assert!(!store.contains(STORAGE_KEY_MNEMONIC).await.unwrap());
    vault.create("pw").await.unwrap();
}

#[tokio::test]
async fn test_with_account_key_signs() {
    let (vault, _) = vault();
    vault.import(ABANDON, "pw").await.unwrap();

    let signature = vault
        .with_account_key(Network::Rootstock, 0, |key| key.sign_personal_message(b"hello"))
        .await
        .unwrap();
    assert!(signature.recovery_id <= 1);
    assert_eq!(signature.to_rsv_hex().len(), 132);
}
