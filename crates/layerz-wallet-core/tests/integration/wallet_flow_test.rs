//! Integration tests for onboarding and persistence
//!
//! These tests run the vault and permission store over a real file store:
//! - Onboarding survives a restart
//! - Whitelist survives a restart and a wallet wipe
//! - Provider registry serves every configured network

use layerz_wallet_core::chain::{NetworkEndpoints, ProviderEndpoints, ProviderRegistry};
use layerz_wallet_core::storage::{STORAGE_DAPP_WHITELIST, STORAGE_KEY_MNEMONIC};
use layerz_wallet_core::{
    Error, FileStore, KdfParams, KeyValueStore, KeyVault, Network, Origin, PermissionStore,
};
use std::sync::Arc;

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[tokio::test]
async fn test_onboarding_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let address = {
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let vault = KeyVault::new(store, KdfParams::light());
        vault.import(ABANDON, "pw").await.unwrap();
        vault.address(Network::Citrea, 2).await.unwrap()
    };

    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let vault = KeyVault::new(store, KdfParams::light());

    // Restarted service starts locked
    assert!(!vault.has_mnemonic().await);
    assert!(vault.has_encrypted_mnemonic().await.unwrap());
    assert!(matches!(
        vault.address(Network::Citrea, 2).await,
        Err(Error::Locked)
    ));

    vault.unlock("pw").await.unwrap();
    assert_eq!(vault.address(Network::Citrea, 2).await.unwrap(), address);
}

#[tokio::test]
async fn test_whitelist_survives_wipe() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let origin = Origin::parse("https://app.example.org/swap").unwrap();

    let vault = KeyVault::new(store.clone(), KdfParams::light());
    vault.import(ABANDON, "pw").await.unwrap();
    let permissions = PermissionStore::load(store.clone()).await.unwrap();
    permissions.whitelist(&origin).await.unwrap();

    vault.wipe().await.unwrap();
    assert!(!store.contains(STORAGE_KEY_MNEMONIC).await.unwrap());
    assert!(store.contains(STORAGE_DAPP_WHITELIST).await.unwrap());

    let reloaded = PermissionStore::load(store).await.unwrap();
    assert!(reloaded.is_whitelisted(&Origin::parse("https://app.example.org").unwrap()));
}

#[tokio::test]
async fn test_registry_from_custom_endpoints() {
    let endpoints = ProviderEndpoints::default()
        .with_network(
            Network::Rootstock,
            NetworkEndpoints::new(vec!["http://127.0.0.1:1", "http://127.0.0.1:2"]),
        )
        .with_request_timeout(1);
    let registry = ProviderRegistry::from_endpoints(&endpoints).unwrap();

    let provider = registry.get(Network::Rootstock).unwrap();
    assert_eq!(provider.network(), Network::Rootstock);
    assert!(provider.is_valid_address("0x9858EfFD232B4033E47d90003D41EC34EcaEda94"));

    // Both endpoints down
    let err = provider
        .get_balance("0x9858EfFD232B4033E47d90003D41EC34EcaEda94")
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{}", err);
}

#[tokio::test]
async fn test_provider_derivation_matches_vault() {
    let store = Arc::new(layerz_wallet_core::MemoryStore::new());
    let vault = KeyVault::new(store, KdfParams::light());
    vault.import(ABANDON, "pw").await.unwrap();

    let registry = ProviderRegistry::from_endpoints(&ProviderEndpoints::default()).unwrap();
    let seed = layerz_wallet_core::keys::mnemonic_to_seed(ABANDON).unwrap();

    for network in Network::ALL {
        let provider = registry.get(network).unwrap();
        assert_eq!(
            provider.derive_address(seed.as_ref(), 0).unwrap(),
            vault.address(network, 0).await.unwrap(),
            "{}",
            network
        );
    }
}
