//! Provider events pushed to pages
//!
//! Covers:
//! - chainChanged and accountsChanged on network and account switches
//! - Events queued before the responses that follow them
//! - Lock and unlock notifications reaching only permitted origins

use super::*;
use layerz_wallet_relay::{ContentScriptRelay, ProviderEvent, RelayConfig};
use serde_json::json;

async fn next(relay: &ContentScriptRelay) -> ProviderEvent {
    tokio::time::timeout(Duration::from_secs(1), relay.next_event())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_network_switch_events_precede_response() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();
    assert_eq!(relay.request("eth_chainId", json!([])).await.unwrap(), json!("0x1e"));

    let state = h.executor.select_network(Network::Botanix).await.unwrap();
    assert_eq!(state.network, Network::Botanix);

    let chain = relay.request("eth_chainId", json!([])).await.unwrap();
    assert_eq!(chain, json!("0xe34"));

    // Already queued by the time the response came back
    let address = h.executor.get_address(Network::Botanix, 0).await.unwrap();
    assert_eq!(
        relay.try_next_event().await,
        Some(ProviderEvent::ChainChanged("0xe34".into()))
    );
    assert_eq!(
        relay.try_next_event().await,
        Some(ProviderEvent::AccountsChanged(vec![address]))
    );
    assert_eq!(relay.try_next_event().await, None);
}

#[tokio::test]
async fn test_network_switch_skips_unpermitted_pages() {
    let h = harness().await;
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();

    h.executor.select_network(Network::Botanix).await.unwrap();
    assert!(relay.request("eth_chainId", json!([])).await.is_ok());
    assert_eq!(relay.try_next_event().await, None);
}

#[tokio::test]
async fn test_account_switch() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();

    h.executor.select_account(1).await.unwrap();
    let second = h.executor.get_address(Network::Rootstock, 1).await.unwrap();
    assert_ne!(second, h.executor.get_address(Network::Rootstock, 0).await.unwrap());

    assert_eq!(next(&relay).await, ProviderEvent::AccountsChanged(vec![second.clone()]));
    assert_eq!(
        relay.request("eth_accounts", json!([])).await.unwrap(),
        json!([second])
    );
}

#[tokio::test]
async fn test_underivable_account_reports_no_accounts() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();

    // Hardened range is not a valid address index
    let index = 1 << 31;
    h.executor.select_account(index).await.unwrap();

    assert_eq!(next(&relay).await, ProviderEvent::AccountsChanged(Vec::new()));
    let err = h.executor.get_address(Network::Rootstock, index).await.unwrap_err();
    assert!(matches!(err, Error::Derivation(_)));
}

#[tokio::test]
async fn test_lock_and_unlock() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let permitted = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();
    let stranger =
        ContentScriptRelay::connect(h.executor.clone(), "https://other.example", RelayConfig::default())
            .unwrap();

    h.executor.lock().await;
    assert_eq!(next(&permitted).await, ProviderEvent::AccountsChanged(Vec::new()));
    let err = permitted.request("eth_accounts", json!([])).await.unwrap_err();
    assert_eq!(err.code, 4101);

    assert!(stranger.request("eth_chainId", json!([])).await.is_ok());
    assert_eq!(stranger.try_next_event().await, None);

    h.executor.unlock(PASSWORD).await.unwrap();
    let address = h.executor.get_address(Network::Rootstock, 0).await.unwrap();
    assert_eq!(next(&permitted).await, ProviderEvent::AccountsChanged(vec![address]));
}

#[tokio::test]
async fn test_event_wire_form() {
    let json = ContentScriptRelay::event_json(&ProviderEvent::AccountsChanged(Vec::new())).unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&json).unwrap(),
        json!({"for": "webpage", "type": "eventCallback", "event": "accountsChanged", "arg": []})
    );
}
