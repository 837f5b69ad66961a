//! Contract client for the stable swap pool and its two tokens.
//!
//! Responsibilities:
//! • Translate typed calls into remote contract invocations.
//! • Decode every result into a typed structure at this boundary.
//! • Classify failures as remote, revert or decode errors.

use crate::amount::TokenAmount;
use crate::errors::Result;
use crate::models::{Direction, PoolSnapshot, Token};
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use serde::Serialize;

pub mod client;
#[cfg(test)]
pub(crate) mod stub;

pub use client::{ConfirmationPolicy, ContractAddresses, EthersContractClient};

/// Counter-amount and fee for a prospective swap, both in the output
/// token's smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteResult {
    pub output: TokenAmount,
    pub fee: TokenAmount,
}

/// Settled amounts decoded from the swap contract's swap events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwapEvent {
    pub user: Address,
    pub direction: Direction,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    pub fee: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceiptSummary {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub swap_event: Option<SwapEvent>,
}

/// Pool parameters as stored on-chain, undecoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractInfo {
    pub exchange_rate: U256,
    pub fee_percentage: U256,
    pub paused: bool,
    pub owner: Address,
}

/// Typed proxy over the swap contract and the two token contracts.
///
/// Every call is remote and may fail with `RemoteCall`, `Revert` or `Decode`.
/// Transactions are submitted and confirmed in separate steps so callers can
/// track which phase a failure belongs to.
#[async_trait]
pub trait ContractClient: Send + Sync {
    /// Address of the swap contract, the spender for token approvals.
    fn swap_contract(&self) -> Address;

    async fn quote(&self, direction: Direction, amount: TokenAmount) -> Result<QuoteResult>;

    async fn submit_swap(&self, direction: Direction, amount: TokenAmount) -> Result<TxHash>;

    async fn pool_balances(&self) -> Result<PoolSnapshot>;

    async fn balance_of(&self, token: Token, owner: Address) -> Result<TokenAmount>;

    async fn allowance(&self, token: Token, owner: Address, spender: Address)
    -> Result<TokenAmount>;

    async fn approve(&self, token: Token, spender: Address, amount: TokenAmount)
    -> Result<TxHash>;

    /// Wait until the transaction is mined with the configured number of
    /// confirmations.
    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<TxReceiptSummary>;

    async fn contract_info(&self) -> Result<ContractInfo>;

    async fn fund_pool(&self, token: Token, amount: TokenAmount) -> Result<TxHash>;

    async fn withdraw(&self, token: Token, amount: TokenAmount) -> Result<TxHash>;

    async fn set_paused(&self, paused: bool) -> Result<TxHash>;
}
