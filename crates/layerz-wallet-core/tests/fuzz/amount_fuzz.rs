//! Fuzz tests for amount formatting and parsing

use layerz_wallet_core::chain::{format_amount, parse_amount};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fuzz_format_parse_roundtrip(raw in 0u128..=21_000_000_00000000u128, decimals in prop::sample::select(vec![8u8, 18u8])) {
        let formatted = format_amount(raw, decimals);
        prop_assert_eq!(parse_amount(&formatted, decimals).unwrap(), raw);
    }

    #[test]
    fn fuzz_parse_never_panics(input in "\\PC{0,40}") {
        let _ = parse_amount(&input, 8);
    }

    #[test]
    fn fuzz_formatted_has_no_trailing_zero_fraction(raw in 1u128..u64::MAX as u128) {
        let formatted = format_amount(raw, 8);
        if let Some((_, fraction)) = formatted.split_once('.') {
            prop_assert!(!fraction.ends_with('0'));
            prop_assert!(fraction.len() <= 8);
        }
    }
}
