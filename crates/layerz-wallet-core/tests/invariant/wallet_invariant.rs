//! Invariant tests for the wallet core
//!
//! - A locked vault never yields key material
//! - Revocation takes effect on the very next lookup
//! - Derivation is a pure function of (mnemonic, network, index)

use layerz_wallet_core::keys::derive_address;
use layerz_wallet_core::{Error, KdfParams, KeyVault, MemoryStore, Network, Origin, PermissionStore};
use std::sync::Arc;

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[tokio::test]
async fn invariant_locked_vault_yields_no_keys() {
    let vault = KeyVault::new(Arc::new(MemoryStore::new()), KdfParams::light());
    vault.import(ABANDON, "pw").await.unwrap();
    vault.lock().await;

    for network in Network::ALL {
        let result = vault
            .with_account_key(network, 0, |key| Ok(key.address().to_string()))
            .await;
        assert!(matches!(result, Err(Error::Locked)), "{}", network);
    }
}

#[tokio::test]
async fn invariant_revocation_is_immediate() {
    let permissions = PermissionStore::load(Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    let origin = Origin::parse("https://dapp.example").unwrap();

    for _ in 0..5 {
        permissions.whitelist(&origin).await.unwrap();
        assert!(permissions.is_whitelisted(&origin));
        permissions.revoke(&origin).await.unwrap();
        assert!(!permissions.is_whitelisted(&origin));
    }
}

#[tokio::test]
async fn invariant_concurrent_grants_all_persist() {
    let store = Arc::new(MemoryStore::new());
    let permissions = Arc::new(PermissionStore::load(store.clone()).await.unwrap());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let permissions = Arc::clone(&permissions);
            tokio::spawn(async move {
                let origin = Origin::parse(&format!("https://dapp{}.example", i)).unwrap();
                permissions.whitelist(&origin).await.unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let reloaded = PermissionStore::load(store).await.unwrap();
    assert_eq!(reloaded.list().len(), 16);
}

#[tokio::test]
async fn invariant_vault_matches_pure_derivation() {
    let vault = KeyVault::new(Arc::new(MemoryStore::new()), KdfParams::light());
    vault.import(ABANDON, "pw").await.unwrap();

    for network in Network::ALL {
        for index in 0..3 {
            assert_eq!(
                vault.address(network, index).await.unwrap(),
                derive_address(ABANDON, network, index).unwrap()
            );
        }
    }
}
