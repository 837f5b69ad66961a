use super::{ContractClient, ContractInfo, QuoteResult, SwapEvent, TxReceiptSummary};
use crate::amount::TokenAmount;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::{Direction, PoolSnapshot, TOKEN_DECIMALS, Token};
use async_trait::async_trait;
use ethers::{
    abi::{Detokenize, RawLog},
    contract::{ContractCall, ContractError, EthLogDecode, abigen},
    providers::{Http, Middleware, PendingTransaction, Provider},
    types::{Address, TransactionReceipt, TxHash, U64},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

abigen!(
    StableSwap,
    r"[
        function getEurcQuote(uint256 usdcAmount) view returns (uint256 eurcAmount, uint256 fee)
        function getUsdcQuote(uint256 eurcAmount) view returns (uint256 usdcAmount, uint256 fee)
        function getPoolBalance() view returns (uint256 usdcBalance, uint256 eurcBalance)
        function swapUSDC(uint256 usdcAmount)
        function swapEURC(uint256 eurcAmount)
        function exchangeRate() view returns (uint256)
        function feePercentage() view returns (uint256)
        function paused() view returns (bool)
        function owner() view returns (address)
        function fundPoolWithUSDC(uint256 amount)
        function fundPoolWithEURC(uint256 amount)
        function withdraw(address token, uint256 amount)
        function setPaused(bool _paused)
        event eurcSwap(address indexed user, uint256 usdcAmount, uint256 eurcAmount, uint256 fee)
        event usdcSwap(address indexed user, uint256 eurcAmount, uint256 usdcAmount, uint256 fee)
        event PoolFunded(uint256 eurcAmount)
        event PoolWithdrawn(address indexed token, uint256 amount)
        event FeeUpdated(uint256 newFee)
        event ExchangeRateUpdated(uint256 newRate)
    ]",
);

abigen!(
    Erc20,
    r"[
        function balanceOf(address account) view returns (uint256)
        function allowance(address owner, address spender) view returns (uint256)
        function approve(address spender, uint256 amount) returns (bool)
        function decimals() view returns (uint8)
    ]",
);

/// On-chain addresses of the swap pool and its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub swap: Address,
    pub usdc: Address,
    pub eurc: Address,
}

/// How long and how deep to wait for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub confirmations: usize,
    pub timeout: Duration,
}

/// `ContractClient` backed by `ethers` bindings. With `Provider<Http>` it can
/// only read; with a `SignerMiddleware` it can also submit transactions.
#[derive(Clone)]
pub struct EthersContractClient<M> {
    client: Arc<M>,
    swap: StableSwap<M>,
    usdc: Erc20<M>,
    eurc: Erc20<M>,
    policy: ConfirmationPolicy,
}

impl EthersContractClient<Provider<Http>> {
    /// Read-only client for pool statistics and quotes.
    pub fn read_only(config: &AppConfig) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(config.rpc_url.as_str())?);
        Ok(Self::new(provider, config.addresses(), config.confirmation_policy()))
    }
}

impl<M: Middleware + 'static> EthersContractClient<M> {
    pub fn new(client: Arc<M>, addresses: ContractAddresses, policy: ConfirmationPolicy) -> Self {
        Self {
            swap: StableSwap::new(addresses.swap, client.clone()),
            usdc: Erc20::new(addresses.usdc, client.clone()),
            eurc: Erc20::new(addresses.eurc, client.clone()),
            client,
            policy,
        }
    }

    fn token(&self, token: Token) -> &Erc20<M> {
        match token {
            Token::Usdc => &self.usdc,
            Token::Eurc => &self.eurc,
        }
    }

    /// Finds the swap event emitted by the pool in a settled receipt.
    fn swap_event(&self, receipt: &TransactionReceipt) -> Option<SwapEvent> {
        let pool = self.swap.address();
        receipt
            .logs
            .iter()
            .filter(|log| log.address == pool)
            .find_map(|log| {
                let raw = RawLog {
                    topics: log.topics.clone(),
                    data: log.data.to_vec(),
                };
                match StableSwapEvents::decode_log(&raw).ok()? {
                    StableSwapEvents::EurcSwapFilter(ev) => Some(SwapEvent {
                        user: ev.user,
                        direction: Direction::UsdcToEurc,
                        amount_in: amount(ev.usdc_amount),
                        amount_out: amount(ev.eurc_amount),
                        fee: amount(ev.fee),
                    }),
                    StableSwapEvents::UsdcSwapFilter(ev) => Some(SwapEvent {
                        user: ev.user,
                        direction: Direction::EurcToUsdc,
                        amount_in: amount(ev.eurc_amount),
                        amount_out: amount(ev.usdc_amount),
                        fee: amount(ev.fee),
                    }),
                    _ => None,
                }
            })
    }
}

fn amount(raw: ethers::types::U256) -> TokenAmount {
    TokenAmount::new(raw, TOKEN_DECIMALS)
}

/// Map an `ethers` contract failure onto the crate's error taxonomy.
fn classify<M: Middleware>(err: ContractError<M>) -> AppError {
    if err.is_revert() {
        let reason = err
            .decode_revert::<String>()
            .unwrap_or_else(|| "execution reverted".to_string());
        return AppError::Revert(reason);
    }
    match err {
        ContractError::DecodingError(e) => AppError::Decode(e.to_string()),
        ContractError::AbiError(e) => AppError::Decode(e.to_string()),
        ContractError::DetokenizationError(e) => AppError::Decode(e.to_string()),
        other => AppError::RemoteCall(other.to_string()),
    }
}

async fn submit<M, D>(call: ContractCall<M, D>) -> Result<TxHash>
where
    M: Middleware + 'static,
    D: Detokenize,
{
    let pending = call.send().await.map_err(classify::<M>)?;
    let tx_hash = pending.tx_hash();
    debug!(tx = ?tx_hash, "[CHAIN] transaction submitted");
    Ok(tx_hash)
}

#[async_trait]
impl<M: Middleware + 'static> ContractClient for EthersContractClient<M> {
    fn swap_contract(&self) -> Address {
        self.swap.address()
    }

    async fn quote(&self, direction: Direction, input: TokenAmount) -> Result<QuoteResult> {
        let (output, fee) = match direction {
            Direction::UsdcToEurc => self.swap.get_eurc_quote(input.raw()).call().await,
            Direction::EurcToUsdc => self.swap.get_usdc_quote(input.raw()).call().await,
        }
        .map_err(classify::<M>)?;
        Ok(QuoteResult {
            output: amount(output),
            fee: amount(fee),
        })
    }

    async fn submit_swap(&self, direction: Direction, input: TokenAmount) -> Result<TxHash> {
        match direction {
            Direction::UsdcToEurc => submit(self.swap.swap_usdc(input.raw())).await,
            Direction::EurcToUsdc => submit(self.swap.swap_eurc(input.raw())).await,
        }
    }

    async fn pool_balances(&self) -> Result<PoolSnapshot> {
        let (usdc, eurc) = self
            .swap
            .get_pool_balance()
            .call()
            .await
            .map_err(classify::<M>)?;
        Ok(PoolSnapshot {
            usdc: amount(usdc),
            eurc: amount(eurc),
        })
    }

    async fn balance_of(&self, token: Token, owner: Address) -> Result<TokenAmount> {
        let raw = self
            .token(token)
            .balance_of(owner)
            .call()
            .await
            .map_err(classify::<M>)?;
        Ok(TokenAmount::new(raw, token.decimals()))
    }

    async fn allowance(
        &self,
        token: Token,
        owner: Address,
        spender: Address,
    ) -> Result<TokenAmount> {
        let raw = self
            .token(token)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(classify::<M>)?;
        Ok(TokenAmount::new(raw, token.decimals()))
    }

    async fn approve(
        &self,
        token: Token,
        spender: Address,
        amount: TokenAmount,
    ) -> Result<TxHash> {
        submit(self.token(token).approve(spender, amount.raw())).await
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<TxReceiptSummary> {
        let pending = PendingTransaction::new(tx, self.client.provider())
            .confirmations(self.policy.confirmations);
        let receipt = tokio::time::timeout(self.policy.timeout, pending)
            .await
            .map_err(|_| {
                AppError::RemoteCall(format!(
                    "timed out after {}s waiting for {tx:?}",
                    self.policy.timeout.as_secs()
                ))
            })??
            .ok_or_else(|| AppError::RemoteCall(format!("transaction {tx:?} was dropped")))?;

        if receipt.status == Some(U64::zero()) {
            return Err(AppError::Revert(format!("transaction {tx:?} reverted")));
        }

        Ok(TxReceiptSummary {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used,
            swap_event: self.swap_event(&receipt),
        })
    }

    async fn contract_info(&self) -> Result<ContractInfo> {
        let exchange_rate = self.swap.exchange_rate().call().await.map_err(classify::<M>)?;
        let fee_percentage = self.swap.fee_percentage().call().await.map_err(classify::<M>)?;
        let paused = self.swap.paused().call().await.map_err(classify::<M>)?;
        let owner = self.swap.owner().call().await.map_err(classify::<M>)?;
        Ok(ContractInfo {
            exchange_rate,
            fee_percentage,
            paused,
            owner,
        })
    }

    async fn fund_pool(&self, token: Token, amount: TokenAmount) -> Result<TxHash> {
        match token {
            Token::Usdc => submit(self.swap.fund_pool_with_usdc(amount.raw())).await,
            Token::Eurc => submit(self.swap.fund_pool_with_eurc(amount.raw())).await,
        }
    }

    async fn withdraw(&self, token: Token, amount: TokenAmount) -> Result<TxHash> {
        let token_address = self.token(token).address();
        submit(self.swap.withdraw(token_address, amount.raw())).await
    }

    async fn set_paused(&self, paused: bool) -> Result<TxHash> {
        submit(self.swap.set_paused(paused)).await
    }
}
