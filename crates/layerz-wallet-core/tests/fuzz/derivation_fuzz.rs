//! Fuzz tests for key derivation and mnemonic sealing

use layerz_wallet_core::keys::{derive_address, generate_mnemonic};
use layerz_wallet_core::vault::{self, SALT_LEN};
use layerz_wallet_core::{KdfParams, Network};
use proptest::prelude::*;

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn network_strategy() -> impl Strategy<Value = Network> {
    prop::sample::select(Network::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fuzz_derivation_is_deterministic(network in network_strategy(), index in 0u32..1000) {
        let a = derive_address(ABANDON, network, index).unwrap();
        let b = derive_address(ABANDON, network, index).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn fuzz_evm_addresses_are_checksummed(index in 0u32..1000) {
        let address = derive_address(ABANDON, Network::Rootstock, index).unwrap();
        prop_assert_eq!(address.len(), 42);
        prop_assert!(address.starts_with("0x"));
        prop_assert_ne!(address[2..].to_lowercase(), address[2..].to_string());
    }

    #[test]
    fn fuzz_seal_roundtrip(password in "[ -~]{1,32}", salt in prop::array::uniform16(any::<u8>())) {
        let phrase = generate_mnemonic().unwrap();
        let blob = vault::encrypt(&phrase, &password, &salt[..SALT_LEN], &KdfParams::light()).unwrap();
        let opened = vault::decrypt(&blob, &password).unwrap();
        prop_assert_eq!(opened.as_str(), phrase.as_str());
    }

    #[test]
    fn fuzz_wrong_password_never_opens(password in "[a-z]{4,16}") {
        let blob = vault::encrypt(ABANDON, &password, &[1u8; SALT_LEN], &KdfParams::light()).unwrap();
        let wrong = format!("{}!", password);
        prop_assert!(vault::decrypt(&blob, &wrong).is_err());
    }
}
