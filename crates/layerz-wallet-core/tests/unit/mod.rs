//! Unit tests module

pub mod network_test;
pub mod swap_test;
pub mod vault_test;
