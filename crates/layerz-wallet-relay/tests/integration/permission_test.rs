//! Whitelist gating of page methods
//!
//! Covers:
//! - Non-whitelisted origins never reach a provider
//! - Revocation from the UI and from the page
//! - Origin isolation
//! - Failed storage writes leave grants as they were

use super::*;
use layerz_wallet_relay::{ContentScriptRelay, ProviderEvent, RelayConfig};
use serde_json::json;

fn relay_for(harness: &Harness, origin: &str) -> ContentScriptRelay {
    ContentScriptRelay::connect(harness.executor.clone(), origin, RelayConfig::default()).unwrap()
}

#[tokio::test]
async fn test_not_whitelisted_never_reaches_provider() {
    let h = harness().await;
    let relay = relay_for(&h, DAPP);

    let err = relay.request("eth_getBalance", json!([])).await.unwrap_err();
    assert_eq!(err.code, 4100);
    let err = relay.request("eth_accounts", json!([])).await.unwrap_err();
    assert_eq!(err.code, 4100);

    assert_eq!(h.rootstock.balance_calls(), 0);
    assert_eq!(h.executor.consent().pending_count(), 0);
}

#[tokio::test]
async fn test_whitelisted_balance() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay_for(&h, DAPP);

    let balance = relay.request("eth_getBalance", json!([])).await.unwrap();
    assert_eq!(balance, json!("0x3e8"));
    assert_eq!(h.rootstock.balance_calls(), 1);
}

#[tokio::test]
async fn test_revoke_from_ui() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay_for(&h, DAPP);
    assert!(relay.request("eth_accounts", json!([])).await.is_ok());

    assert!(h.executor.revoke_dapp(DAPP).await.unwrap());
    let err = relay.request("eth_accounts", json!([])).await.unwrap_err();
    assert_eq!(err.code, 4100);
    assert_eq!(
        relay.try_next_event().await,
        Some(ProviderEvent::AccountsChanged(Vec::new()))
    );

    // Revoking twice is not an error
    assert!(!h.executor.revoke_dapp(DAPP).await.unwrap());
}

#[tokio::test]
async fn test_revoke_from_page() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay_for(&h, DAPP);

    let result = relay.request("wallet_revokePermissions", json!([])).await.unwrap();
    assert!(result.is_null());
    assert_eq!(
        relay.try_next_event().await,
        Some(ProviderEvent::AccountsChanged(Vec::new()))
    );
    assert!(!h.executor.is_whitelisted(DAPP).await.unwrap());
}

#[tokio::test]
async fn test_origin_isolation() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();

    for other in ["https://evil.example", "http://dapp.example", "https://dapp.example:8443"] {
        let relay = relay_for(&h, other);
        let err = relay.request("eth_accounts", json!([])).await.unwrap_err();
        assert_eq!(err.code, 4100, "{}", other);
    }

    // Path and trailing slash do not change the origin
    let relay = relay_for(&h, "https://dapp.example/swap?x=1");
    assert!(relay.request("eth_accounts", json!([])).await.is_ok());
}

#[tokio::test]
async fn test_revoke_only_notifies_that_origin() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    h.executor.whitelist_dapp("https://other.example").await.unwrap();
    let dapp = relay_for(&h, DAPP);
    let other = relay_for(&h, "https://other.example");

    h.executor.revoke_dapp(DAPP).await.unwrap();

    assert!(other.request("eth_accounts", json!([])).await.is_ok());
    assert_eq!(other.try_next_event().await, None);
    let event = tokio::time::timeout(Duration::from_secs(1), dapp.next_event())
        .await
        .unwrap();
    assert_eq!(event, Some(ProviderEvent::AccountsChanged(Vec::new())));
}

#[tokio::test]
async fn test_failed_grant_leaves_origin_unlisted() {
    let h = harness().await;
    let relay = relay_for(&h, DAPP);
    let ui = consent_ui(&h.executor, true);

    h.store.set_failing(true);
    assert!(relay.request("eth_requestAccounts", json!([])).await.is_err());
    ui.await.unwrap();

    assert!(!h.executor.is_whitelisted(DAPP).await.unwrap());
    let err = relay.request("eth_accounts", json!([])).await.unwrap_err();
    assert_eq!(err.code, 4100);
}

#[tokio::test]
async fn test_failed_revoke_keeps_grant() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay_for(&h, DAPP);

    h.store.set_failing(true);
    assert!(h.executor.revoke_dapp(DAPP).await.is_err());

    assert!(h.executor.is_whitelisted(DAPP).await.unwrap());
    assert!(relay.request("eth_accounts", json!([])).await.is_ok());
    assert_eq!(relay.try_next_event().await, None);
}
