//! In-memory `ContractClient` for tests. Never touches the network.

use super::{ContractClient, ContractInfo, QuoteResult, TxReceiptSummary};
use crate::amount::TokenAmount;
use crate::errors::{AppError, Result};
use crate::models::{Direction, PoolSnapshot, TOKEN_DECIMALS, Token};
use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Remote,
    Revert(&'static str),
    Decode,
}

/// Pool quoting `rate_bps` of the input, minus `fee_bps` of that gross amount.
pub(crate) struct StubContractClient {
    pub swap: Address,
    pub rate_bps: u64,
    pub fee_bps: u64,
    pub pool: Mutex<PoolSnapshot>,
    pub balances: Mutex<HashMap<Token, U256>>,
    pub allowances: Mutex<HashMap<Token, U256>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
    hold: Mutex<HashMap<&'static str, Arc<Notify>>>,
    calls: Mutex<Vec<&'static str>>,
    next_tx: AtomicU64,
}

impl Default for StubContractClient {
    fn default() -> Self {
        let six = |n: u64| TokenAmount::new(U256::from(n * 1_000_000), TOKEN_DECIMALS);
        Self {
            swap: Address::from_low_u64_be(0x5a),
            rate_bps: 9_200,
            fee_bps: 30,
            pool: Mutex::new(PoolSnapshot {
                usdc: six(10_000),
                eurc: six(8_000),
            }),
            balances: Mutex::new(HashMap::from([
                (Token::Usdc, U256::from(100_000_000u64)),
                (Token::Eurc, U256::from(50_000_000u64)),
            ])),
            allowances: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            hold: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_tx: AtomicU64::new(1),
        }
    }
}

impl StubContractClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, method: &'static str, failure: Failure) {
        self.failures.lock().unwrap().insert(method, failure);
    }

    pub fn clear_failure(&self, method: &'static str) {
        self.failures.lock().unwrap().remove(method);
    }

    pub fn set_allowance(&self, token: Token, raw: U256) {
        self.allowances.lock().unwrap().insert(token, raw);
    }

    /// Park every call to `method` until the returned `Notify` fires.
    pub fn hold(&self, method: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.hold.lock().unwrap().insert(method, notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    async fn enter(&self, method: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(method);
        let parked = self.hold.lock().unwrap().get(method).cloned();
        if let Some(notify) = parked {
            notify.notified().await;
        }
        let failure = self.failures.lock().unwrap().get(method).copied();
        match failure {
            None => Ok(()),
            Some(Failure::Remote) => Err(AppError::RemoteCall(format!("{method}: connection reset"))),
            Some(Failure::Revert(reason)) => Err(AppError::Revert(reason.to_string())),
            Some(Failure::Decode) => Err(AppError::Decode(format!("{method}: short return data"))),
        }
    }

    fn tx(&self) -> TxHash {
        TxHash::from_low_u64_be(self.next_tx.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ContractClient for StubContractClient {
    fn swap_contract(&self) -> Address {
        self.swap
    }

    async fn quote(&self, direction: Direction, amount: TokenAmount) -> Result<QuoteResult> {
        self.enter("quote").await?;
        let gross = amount.raw() * U256::from(self.rate_bps) / U256::from(10_000u64);
        let fee = gross * U256::from(self.fee_bps) / U256::from(10_000u64);
        let decimals = direction.output_token().decimals();
        Ok(QuoteResult {
            output: TokenAmount::new(gross - fee, decimals),
            fee: TokenAmount::new(fee, decimals),
        })
    }

    async fn submit_swap(&self, _direction: Direction, _amount: TokenAmount) -> Result<TxHash> {
        self.enter("submit_swap").await?;
        Ok(self.tx())
    }

    async fn pool_balances(&self) -> Result<PoolSnapshot> {
        self.enter("pool_balances").await?;
        Ok(*self.pool.lock().unwrap())
    }

    async fn balance_of(&self, token: Token, _owner: Address) -> Result<TokenAmount> {
        self.enter("balance_of").await?;
        let raw = self.balances.lock().unwrap().get(&token).copied().unwrap_or_default();
        Ok(TokenAmount::new(raw, token.decimals()))
    }

    async fn allowance(
        &self,
        token: Token,
        _owner: Address,
        _spender: Address,
    ) -> Result<TokenAmount> {
        self.enter("allowance").await?;
        let raw = self.allowances.lock().unwrap().get(&token).copied().unwrap_or_default();
        Ok(TokenAmount::new(raw, token.decimals()))
    }

    async fn approve(
        &self,
        token: Token,
        _spender: Address,
        amount: TokenAmount,
    ) -> Result<TxHash> {
        self.enter("approve").await?;
        self.set_allowance(token, amount.raw());
        Ok(self.tx())
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<TxReceiptSummary> {
        self.enter("wait_for_confirmation").await?;
        Ok(TxReceiptSummary {
            tx_hash: tx,
            block_number: Some(1),
            gas_used: Some(U256::from(21_000u64)),
            swap_event: None,
        })
    }

    async fn contract_info(&self) -> Result<ContractInfo> {
        self.enter("contract_info").await?;
        Ok(ContractInfo {
            exchange_rate: U256::from(self.rate_bps),
            fee_percentage: U256::from(self.fee_bps),
            paused: false,
            owner: Address::from_low_u64_be(0x0e),
        })
    }

    async fn fund_pool(&self, _token: Token, _amount: TokenAmount) -> Result<TxHash> {
        self.enter("fund_pool").await?;
        Ok(self.tx())
    }

    async fn withdraw(&self, _token: Token, _amount: TokenAmount) -> Result<TxHash> {
        self.enter("withdraw").await?;
        Ok(self.tx())
    }

    async fn set_paused(&self, _paused: bool) -> Result<TxHash> {
        self.enter("set_paused").await?;
        Ok(self.tx())
    }
}
