//! Unit tests for swap routing

use async_trait::async_trait;
use layerz_wallet_core::swap::{ProgressCallback, SwapPair};
use layerz_wallet_core::{Network, Result, SwapProvider, SwapRegistry};
use std::sync::Arc;

/// Provider that answers with a fixed URL
struct FixedProvider {
    name: &'static str,
    pairs: Vec<SwapPair>,
}

#[async_trait]
impl SwapProvider for FixedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn pairs(&self) -> &[SwapPair] {
        &self.pairs
    }

    fn fee_basis_points(&self) -> u32 {
        25
    }

    async fn swap(
        &self,
        _from: Network,
        _progress: ProgressCallback<'_>,
        _to: Network,
        _amount: u128,
        _destination: &str,
    ) -> Result<String> {
        Ok(format!("https://{}.example/swap", self.name))
    }
}

#[tokio::test]
async fn test_first_registered_provider_wins() {
    let mut registry = SwapRegistry::with_defaults();
    registry.register(Arc::new(FixedProvider {
        name: "second",
        pairs: vec![SwapPair::new(Network::Bitcoin, Network::Rootstock)],
    }));

    let providers = registry.providers_for(Network::Bitcoin, Network::Rootstock);
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[0].name(), "Boltz");

    let url = registry
        .swap(Network::Bitcoin, &|_| {}, Network::Rootstock, 10_000, "0xabc")
        .await
        .unwrap();
    assert!(url.contains("boltz"));
}

#[tokio::test]
async fn test_extra_provider_extends_pairs() {
    let mut registry = SwapRegistry::with_defaults();
    registry.register(Arc::new(FixedProvider {
        name: "citrea-bridge",
        pairs: vec![SwapPair::new(Network::Bitcoin, Network::Citrea)],
    }));

    let url = registry
        .swap(Network::Bitcoin, &|_| {}, Network::Citrea, 1, "0xabc")
        .await
        .unwrap();
    assert_eq!(url, "https://citrea-bridge.example/swap");
    assert_eq!(
        registry.destinations_from(Network::Bitcoin),
        vec![Network::Rootstock, Network::Citrea]
    );

    let quote = registry.quote(Network::Bitcoin, Network::Citrea, 1).unwrap();
    assert_eq!(quote.fee_basis_points, 25);
}

#[test]
fn test_empty_registry_rejects_everything() {
    let registry = SwapRegistry::new();
    let err = registry
        .quote(Network::Bitcoin, Network::Rootstock, 1)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Swap pair bitcoin->rootstock not supported by any provider"
    );
}
