//! PatronPay Core
//!
//! Shared domain types for the PatronPay payment core: payment purposes,
//! subscription tiers, and lamport/SOL conversion helpers. This crate is
//! pure — no I/O, no chain types.

mod types;

pub use types::*;
