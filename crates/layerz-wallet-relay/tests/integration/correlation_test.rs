//! Response routing between one page and the executor
//!
//! Covers:
//! - Responses arriving out of order
//! - Relay-side timeouts and late responses
//! - Page teardown with calls in flight
//! - Many concurrent calls, each answered once

use super::*;
use futures_util::future::join_all;
use layerz_wallet_relay::{ContentScriptRelay, RelayConfig};
use serde_json::json;
use tokio::time::Instant;

async fn slow_harness(delay: Duration) -> Harness {
    harness_with(
        MockProvider::new(Network::Rootstock, 1_000).with_delay(delay),
        test_config(),
    )
    .await
}

#[tokio::test]
async fn test_fast_call_overtakes_slow_call() {
    let h = slow_harness(Duration::from_millis(300)).await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();

    let started = Instant::now();
    let (balance, chain) = tokio::join!(
        relay.request("eth_getBalance", json!([])),
        async {
            let chain = relay.request("eth_chainId", json!([])).await;
            (chain, started.elapsed())
        }
    );

    assert_eq!(balance.unwrap(), json!("0x3e8"));
    let (chain, elapsed) = chain;
    assert_eq!(chain.unwrap(), json!("0x1e"));
    assert!(elapsed < Duration::from_millis(300));
    assert_eq!(relay.pending_count(), 0);
}

#[tokio::test]
async fn test_timeout_and_late_response() {
    let h = slow_harness(Duration::from_millis(200)).await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let config = RelayConfig::default().with_request_timeout(Duration::from_millis(50));
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, config).unwrap();

    let err = relay.request("eth_getBalance", json!([])).await.unwrap_err();
    assert_eq!(err.code, 5002);
    assert_eq!(relay.pending_count(), 0);

    // The executor still answers; the relay drops it
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.rootstock.balance_calls(), 1);
    let stats = relay.stats();
    assert_eq!(stats.total_timed_out, 1);
    assert_eq!(stats.total_resolved, 0);

    // The relay keeps working
    assert_eq!(relay.request("eth_chainId", json!([])).await.unwrap(), json!("0x1e"));
}

#[tokio::test]
async fn test_close_releases_pending_calls() {
    let h = slow_harness(Duration::from_millis(500)).await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = Arc::new(
        ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap(),
    );

    let call = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.request("eth_getBalance", json!([])).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(relay.pending_count(), 1);

    relay.close();
    assert!(call.await.unwrap().is_err());
    assert_eq!(relay.pending_count(), 0);
    assert_eq!(relay.stats().total_released, 1);
    assert_eq!(h.executor.events().port_count(), 0);

    // Closed relays refuse new calls
    assert!(relay.request("eth_chainId", json!([])).await.is_err());
    // Closing again is harmless
    relay.close();
}

#[tokio::test]
async fn test_concurrent_calls_resolve_once() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();
    let address = h.executor.get_address(Network::Rootstock, 0).await.unwrap();

    let calls = (0..50).map(|i| {
        let method = if i % 2 == 0 { "eth_chainId" } else { "eth_accounts" };
        let relay = &relay;
        async move { (method, relay.request(method, json!([])).await) }
    });

    for (method, result) in join_all(calls).await {
        let value = result.unwrap();
        match method {
            "eth_chainId" => assert_eq!(value, json!("0x1e")),
            _ => assert_eq!(value, json!([address])),
        }
    }

    let stats = relay.stats();
    assert_eq!(stats.total_registered, 50);
    assert_eq!(stats.total_resolved, 50);
    assert_eq!(relay.pending_count(), 0);
}

#[tokio::test]
async fn test_relays_do_not_share_responses() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let allowed = ContentScriptRelay::connect(h.executor.clone(), DAPP, RelayConfig::default()).unwrap();
    let denied =
        ContentScriptRelay::connect(h.executor.clone(), "https://evil.example", RelayConfig::default())
            .unwrap();

    // Both relays start their ids at 1
    let (a, b) = tokio::join!(
        allowed.request("eth_accounts", json!([])),
        denied.request("eth_accounts", json!([]))
    );
    assert!(a.is_ok());
    assert_eq!(b.unwrap_err().code, 4100);
}
