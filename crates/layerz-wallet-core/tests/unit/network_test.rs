//! Unit tests for the network table and key derivation

use layerz_wallet_core::keys::{self, derive_address};
use layerz_wallet_core::network::{AddressKind, NetworkFamily};
use layerz_wallet_core::{Error, Network};

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

// ============================================================================
// Network Table
// ============================================================================

#[test]
fn test_every_network_has_consistent_info() {
    for network in Network::ALL {
        let info = network.info();
        assert_eq!(info.network, network);
        assert_eq!(info.chain_id.is_some(), info.family == NetworkFamily::Evm);
        if info.family == NetworkFamily::Evm {
            assert_eq!(info.decimals, 18);
            assert_eq!(info.derivation.kind, AddressKind::Evm);
        } else {
            assert_eq!(info.decimals, 8);
        }
    }
}

#[test]
fn test_unknown_network_code() {
    let err = "litecoin".parse::<Network>().unwrap_err();
    assert_eq!(err.code(), layerz_wallet_core::error::codes::UNSUPPORTED_NETWORK);
}

// ============================================================================
// Derivation
// ============================================================================

#[test]
fn test_bip84_vector() {
    assert_eq!(
        derive_address(ABANDON, Network::Bitcoin, 0).unwrap(),
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
    );
}

#[test]
fn test_evm_vector_shared_across_evm_networks() {
    let expected = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";
    for network in [
        Network::Rootstock,
        Network::Botanix,
        Network::Strata,
        Network::Citrea,
        Network::Sepolia,
    ] {
        assert_eq!(derive_address(ABANDON, network, 0).unwrap(), expected);
    }
}

#[test]
fn test_indices_yield_distinct_addresses() {
    let a = derive_address(ABANDON, Network::Rootstock, 0).unwrap();
    let b = derive_address(ABANDON, Network::Rootstock, 1).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_address_shapes() {
    let ark = derive_address(ABANDON, Network::Ark, 0).unwrap();
    assert!(ark.starts_with("tb1p"), "{}", ark);

    let breez = derive_address(ABANDON, Network::Breez, 0).unwrap();
    assert_eq!(breez.len(), 66);
    assert!(breez.starts_with("02") || breez.starts_with("03"));

    // Mainnet and testnet node keys differ by coin type
    let breeztest = derive_address(ABANDON, Network::BreezTest, 0).unwrap();
    assert_ne!(breez, breeztest);
}

#[test]
fn test_invalid_mnemonic_rejected() {
    let err = derive_address("abandon abandon abandon", Network::Bitcoin, 0).unwrap_err();
    assert!(matches!(err, Error::InvalidMnemonic(_)));

    // Bad checksum
    let phrase = ["abandon"; 12].join(" ");
    assert!(keys::validate_mnemonic(&phrase).is_err());
}

#[test]
fn test_generated_mnemonic_is_valid() {
    let phrase = keys::generate_mnemonic().unwrap();
    assert_eq!(phrase.split_whitespace().count(), keys::MNEMONIC_WORDS);
    keys::validate_mnemonic(&phrase).unwrap();
}
