//! Consent-gated page methods
//!
//! Covers:
//! - eth_requestAccounts allowed, denied and left unanswered
//! - personal_sign and eth_sendTransaction behind consent
//! - Delivery receipts reaching the consent UI
//! - Raw page envelopes keeping the page's own id

use super::*;
use layerz_wallet_relay::{ContentScriptRelay, RelayConfig, RpcError};
use serde_json::{Value, json};

fn relay(harness: &Harness) -> ContentScriptRelay {
    ContentScriptRelay::connect(harness.executor.clone(), DAPP, RelayConfig::default()).unwrap()
}

#[tokio::test]
async fn test_request_accounts_allowed() {
    let h = harness().await;
    let relay = relay(&h);
    let ui = consent_ui(&h.executor, true);

    let accounts = relay.request("eth_requestAccounts", json!([])).await.unwrap();
    let expected = h.executor.get_address(Network::Rootstock, 0).await.unwrap();
    assert_eq!(accounts, json!([expected]));

    // The UI learns the page received the answer
    assert!(ui.await.unwrap());
    assert!(h.executor.is_whitelisted(DAPP).await.unwrap());
}

#[tokio::test]
async fn test_request_accounts_skips_consent_when_whitelisted() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay(&h);

    let accounts = relay.request("eth_requestAccounts", json!([])).await.unwrap();
    assert_eq!(accounts.as_array().unwrap().len(), 1);
    assert_eq!(h.executor.consent().pending_count(), 0);
}

#[tokio::test]
async fn test_request_accounts_denied() {
    let h = harness().await;
    let relay = relay(&h);
    let ui = consent_ui(&h.executor, false);

    let err = relay.request("eth_requestAccounts", json!([])).await.unwrap_err();
    assert_eq!(err, RpcError::new(4001, "User rejected the request."));
    assert!(ui.await.unwrap());
    assert!(!h.executor.is_whitelisted(DAPP).await.unwrap());
}

#[tokio::test]
async fn test_unanswered_consent_is_rejection() {
    let h = harness().await;
    let relay = relay(&h);

    let err = relay.request("eth_requestAccounts", json!([])).await.unwrap_err();
    assert!(err.is_user_rejected());
    assert_eq!(h.executor.consent().pending_count(), 0);
    assert!(!h.executor.is_whitelisted(DAPP).await.unwrap());
}

#[tokio::test]
async fn test_personal_sign_allowed() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay(&h);
    let ui = consent_ui(&h.executor, true);

    let signature = relay
        .request("personal_sign", json!(["0x68656c6c6f"]))
        .await
        .unwrap();
    let signature = signature.as_str().unwrap();
    assert!(signature.starts_with("0x"));
    assert_eq!(signature.len(), 132);
    assert!(ui.await.unwrap());
}

#[tokio::test]
async fn test_personal_sign_denied() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay(&h);
    let _ui = consent_ui(&h.executor, false);

    let err = relay.request("personal_sign", json!(["hello"])).await.unwrap_err();
    assert!(err.is_user_rejected());
}

#[tokio::test]
async fn test_personal_sign_needs_whitelist_before_consent() {
    let h = harness().await;
    let relay = relay(&h);

    let err = relay.request("personal_sign", json!(["hello"])).await.unwrap_err();
    assert_eq!(err.code, 4100);
    assert_eq!(h.executor.consent().pending_count(), 0);
}

#[tokio::test]
async fn test_send_transaction_allowed() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay(&h);
    let ui = consent_ui(&h.executor, true);

    let hash = relay
        .request("eth_sendTransaction", json!([{ "to": RECIPIENT, "value": "0x10" }]))
        .await
        .unwrap();
    assert!(hash.as_str().unwrap().starts_with("0x"));
    assert!(ui.await.unwrap());

    let broadcasts = h.rootstock.broadcasts.lock();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(Value::String(broadcasts[0].tx_hash.clone()), hash);
}

#[tokio::test]
async fn test_send_transaction_denied_never_broadcasts() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay(&h);
    let _ui = consent_ui(&h.executor, false);

    let err = relay
        .request("eth_sendTransaction", json!([{ "to": RECIPIENT, "value": "0x10" }]))
        .await
        .unwrap_err();
    assert!(err.is_user_rejected());
    assert!(h.rootstock.broadcasts.lock().is_empty());
}

#[tokio::test]
async fn test_page_message_keeps_page_id() {
    let h = harness().await;
    h.executor.whitelist_dapp(DAPP).await.unwrap();
    let relay = relay(&h);

    let raw = relay
        .handle_page_message(r#"{"for":"background","id":77,"method":"eth_chainId","params":[]}"#)
        .await
        .unwrap();
    let response: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(response, json!({"for": "webpage", "id": 77, "response": "0x1e"}));
}

#[tokio::test]
async fn test_page_message_rejects_malformed() {
    let h = harness().await;
    let relay = relay(&h);

    assert!(relay.handle_page_message("not json").await.is_none());
    assert!(
        relay
            .handle_page_message(r#"{"for":"background","id":0,"method":"eth_chainId"}"#)
            .await
            .is_none()
    );
    // Responses posted by the page are not requests
    assert!(
        relay
            .handle_page_message(r#"{"for":"webpage","id":3,"response":"0x1"}"#)
            .await
            .is_none()
    );
}
