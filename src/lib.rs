//! Client for a two-token stable swap pool.
//!
//! Connects a wallet, quotes swaps against the pool contract, sequences the
//! allowance check, approval, swap and confirmation, and keeps balances and
//! pool totals fresh. The pricing itself lives in the contract.

pub mod amount;
pub mod chain;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod quote;
pub mod refresher;
pub mod session;
pub mod swap;
pub mod utils;
pub mod wallet;
