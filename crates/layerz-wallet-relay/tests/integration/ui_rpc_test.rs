//! Privileged operations by UI method name
//!
//! Covers:
//! - Onboarding, lock state and password errors
//! - Network selection and swap errors
//! - Terms of service and wipe

use super::*;
use serde_json::json;

fn code(result: layerz_wallet_core::Result<serde_json::Value>) -> i64 {
    result.unwrap_err().code()
}

#[tokio::test]
async fn test_lock_state() {
    let h = harness().await;
    let ui = &h.executor;

    assert_eq!(ui.handle_ui_request("hasMnemonic", json!(null)).await.unwrap(), json!(true));
    ui.handle_ui_request("lock", json!(null)).await.unwrap();
    assert_eq!(ui.handle_ui_request("hasMnemonic", json!(null)).await.unwrap(), json!(false));
    assert_eq!(
        ui.handle_ui_request("hasEncryptedMnemonic", json!(null)).await.unwrap(),
        json!(true)
    );

    assert_eq!(code(ui.handle_ui_request("getAddress", json!({})).await), 4101);
    assert_eq!(
        code(ui.handle_ui_request("unlock", json!({ "password": "wrong" })).await),
        4103
    );
    ui.handle_ui_request("unlock", json!({ "password": PASSWORD })).await.unwrap();
    assert!(ui.handle_ui_request("getAddress", json!({})).await.unwrap().is_string());
}

#[tokio::test]
async fn test_second_onboarding_fails() {
    let h = harness().await;
    assert!(
        h.executor
            .handle_ui_request("createMnemonic", json!({ "password": "other" }))
            .await
            .is_err()
    );
    // The imported wallet is untouched
    h.executor.lock().await;
    h.executor.unlock(PASSWORD).await.unwrap();
}

#[tokio::test]
async fn test_select_network() {
    let h = harness().await;
    let ui = &h.executor;

    let state = ui
        .handle_ui_request("selectNetwork", json!({ "network": "botanix" }))
        .await
        .unwrap();
    assert_eq!(state, json!({ "network": "botanix", "accountIndex": 0 }));

    // No provider registered for strata
    assert_eq!(
        code(ui.handle_ui_request("selectNetwork", json!({ "network": "strata" })).await),
        4901
    );
    assert_eq!(ui.session_state().await.network, Network::Botanix);
}

#[tokio::test]
async fn test_balance_and_send() {
    let h = harness().await;
    let ui = &h.executor;

    let balance = ui.handle_ui_request("getBalance", json!({})).await.unwrap();
    assert_eq!(balance["raw"], json!("1000"));

    let from = ui.get_address(Network::Rootstock, 0).await.unwrap();
    let sent = ui
        .handle_ui_request(
            "sendTransaction",
            json!({ "txParams": { "from": from, "to": RECIPIENT, "value": 5 } }),
        )
        .await
        .unwrap();
    assert!(sent["hash"].as_str().unwrap().starts_with("0x"));

    let bad = ui
        .handle_ui_request(
            "sendTransaction",
            json!({ "txParams": { "from": from, "to": "nope", "value": 5 } }),
        )
        .await;
    assert_eq!(code(bad), -32602);
    assert_eq!(h.rootstock.broadcasts.lock().len(), 1);
}

#[tokio::test]
async fn test_unsupported_swap_pair() {
    let h = harness().await;
    let err = h
        .executor
        .handle_ui_request(
            "swap",
            json!({ "from": "breeztest", "to": "botanix", "amount": "1", "destination": "0x123" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Swap pair breeztest->botanix not supported by Boltz");
    assert_eq!(err.code(), 4902);
}

#[tokio::test]
async fn test_terms_of_service() {
    let h = harness().await;
    let ui = &h.executor;

    assert_eq!(
        ui.handle_ui_request("hasAcceptedTermsOfService", json!(null)).await.unwrap(),
        json!(false)
    );
    ui.handle_ui_request("acceptTermsOfService", json!(null)).await.unwrap();
    assert_eq!(
        ui.handle_ui_request("hasAcceptedTermsOfService", json!(null)).await.unwrap(),
        json!(true)
    );
}

#[tokio::test]
async fn test_wipe() {
    let h = harness().await;
    let ui = &h.executor;
    ui.whitelist_dapp(DAPP).await.unwrap();
    ui.accept_terms_of_service().await.unwrap();
    ui.select_account(2).await.unwrap();

    ui.handle_ui_request("wipe", json!(null)).await.unwrap();

    assert_eq!(ui.handle_ui_request("hasMnemonic", json!(null)).await.unwrap(), json!(false));
    assert_eq!(
        ui.handle_ui_request("hasEncryptedMnemonic", json!(null)).await.unwrap(),
        json!(false)
    );
    assert_eq!(ui.handle_ui_request("listWhitelist", json!(null)).await.unwrap(), json!([]));
    assert_eq!(
        ui.handle_ui_request("sessionState", json!(null)).await.unwrap(),
        json!({ "network": "rootstock", "accountIndex": 0 })
    );
    assert!(!ui.has_accepted_terms_of_service().await.unwrap());
    assert_eq!(code(ui.handle_ui_request("getAddress", json!({})).await), 4102);
}

#[tokio::test]
async fn test_unknown_method() {
    let h = harness().await;
    assert_eq!(
        code(h.executor.handle_ui_request("mineBlocks", json!(null)).await),
        4200
    );
}

#[tokio::test]
async fn test_list_transactions() {
    let h = harness().await;
    let history = h
        .executor
        .handle_ui_request("listTransactions", json!({ "network": "botanix", "accountIndex": 1 }))
        .await
        .unwrap();
    assert_eq!(history, json!([]));

    assert_eq!(
        code(
            h.executor
                .handle_ui_request("listTransactions", json!({ "network": "citrea" }))
                .await
        ),
        4901
    );
}

#[tokio::test]
async fn test_exchange_rate_retries_transport_failures() {
    let config = test_config().with_retry(RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(50),
    });
    let h = harness_with(MockProvider::new(Network::Rootstock, 1_000), config).await;

    let started = tokio::time::Instant::now();
    let err = h
        .executor
        .get_exchange_rate(Network::Bitcoin, "USD")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    // Two backoff sleeps: 50ms then 100ms
    assert!(started.elapsed() >= Duration::from_millis(150));
}
