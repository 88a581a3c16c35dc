//! Fuzz tests module
//!
//! Property-based testing using proptest.

pub mod amount_fuzz;
pub mod derivation_fuzz;
