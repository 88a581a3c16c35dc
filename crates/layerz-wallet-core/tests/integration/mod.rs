//! Integration tests module

pub mod wallet_flow_test;
