//! Swap orchestration: allowance check, approval, swap, confirmation.
//!
//! One attempt at a time. The phase lives in a `watch` channel so the
//! presentation layer can follow along, and entering `CheckingAllowance` is
//! a single check-and-set on that channel.

use crate::amount::TokenAmount;
use crate::chain::{ContractClient, TxReceiptSummary};
use crate::errors::{AppError, Result};
use crate::models::Direction;
use crate::quote::{Quote, QuoteEngine};
use crate::refresher::Refresher;
use ethers::types::{Address, TxHash};
use serde::Serialize;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SwapFailure {
    /// Request rejected before any transaction: bad amount, output below
    /// the minimum, or the quote/allowance read failed.
    Precheck(String),
    ApprovalFailed(String),
    SwapFailed(String),
}

impl fmt::Display for SwapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapFailure::Precheck(r) => write!(f, "{r}"),
            SwapFailure::ApprovalFailed(r) => write!(f, "approval failed: {r}"),
            SwapFailure::SwapFailed(r) => write!(f, "swap failed: {r}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SwapPhase {
    #[default]
    Idle,
    CheckingAllowance,
    Approving,
    Swapping,
    Confirming,
    Settled,
    Failed(SwapFailure),
}

impl SwapPhase {
    /// A new attempt may start only from these phases.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapPhase::Idle | SwapPhase::Settled | SwapPhase::Failed(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub owner: Address,
    pub direction: Direction,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapOutcome {
    pub quote: Quote,
    pub approval_tx: Option<TxHash>,
    pub swap_tx: TxHash,
    pub receipt: TxReceiptSummary,
}

pub struct SwapOrchestrator {
    phase: watch::Sender<SwapPhase>,
    quotes: QuoteEngine,
}

impl SwapOrchestrator {
    pub fn new(quotes: QuoteEngine) -> Self {
        let (phase, _) = watch::channel(SwapPhase::Idle);
        Self { phase, quotes }
    }

    pub fn phase(&self) -> SwapPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapPhase> {
        self.phase.subscribe()
    }

    fn begin(&self) -> Result<()> {
        let started = self.phase.send_if_modified(|phase| {
            if phase.is_terminal() {
                *phase = SwapPhase::CheckingAllowance;
                true
            } else {
                false
            }
        });
        if started {
            Ok(())
        } else {
            Err(AppError::SwapInProgress)
        }
    }

    fn enter(&self, next: SwapPhase) {
        debug!(phase = ?next, "[SWAP] phase");
        self.phase.send_replace(next);
    }

    /// `Settled` back to `Idle`, unless a newer attempt already started
    /// while this one was refreshing.
    fn settle(&self) {
        self.phase.send_if_modified(|phase| {
            if *phase == SwapPhase::Settled {
                *phase = SwapPhase::Idle;
                true
            } else {
                false
            }
        });
    }

    fn fail(&self, failure: SwapFailure) {
        warn!(%failure, "[SWAP] attempt failed");
        self.phase.send_replace(SwapPhase::Failed(failure));
    }

    /// Run one swap attempt to a terminal phase.
    ///
    /// Returns `SwapInProgress` without touching the network if another
    /// attempt has not finished. On success the balances and pool are
    /// refreshed through `refresher` and the phase returns to `Idle`.
    pub async fn execute(
        &self,
        client: &dyn ContractClient,
        request: SwapRequest,
        refresher: &Refresher,
    ) -> Result<SwapOutcome> {
        self.begin()?;
        info!(
            amount = %request.amount,
            token = %request.direction.input_token(),
            "[SWAP] attempt started"
        );

        let (quote, allowance) = match self.precheck(client, &request).await {
            Ok(checked) => checked,
            Err(e) => {
                self.fail(SwapFailure::Precheck(e.reason()));
                return Err(e);
            }
        };

        let mut approval_tx = None;
        if allowance.raw() < request.amount.raw() {
            self.enter(SwapPhase::Approving);
            match self.approve(client, &request).await {
                Ok(tx) => approval_tx = Some(tx),
                Err(e) => {
                    let reason = e.reason();
                    self.fail(SwapFailure::ApprovalFailed(reason.clone()));
                    return Err(AppError::ApprovalFailed(reason));
                }
            }
        }

        self.enter(SwapPhase::Swapping);
        let swap_tx = match client.submit_swap(request.direction, request.amount).await {
            Ok(tx) => tx,
            Err(e) => {
                let reason = e.reason();
                self.fail(SwapFailure::SwapFailed(reason.clone()));
                return Err(AppError::SwapFailed(reason));
            }
        };

        self.enter(SwapPhase::Confirming);
        let receipt = match client.wait_for_confirmation(swap_tx).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let reason = e.reason();
                self.fail(SwapFailure::SwapFailed(reason.clone()));
                return Err(AppError::SwapFailed(reason));
            }
        };

        self.enter(SwapPhase::Settled);
        info!(tx = ?swap_tx, block = ?receipt.block_number, "[SWAP] settled");
        refresher.publish_pool(client).await;
        refresher
            .publish_balances(client, request.owner, request.direction)
            .await;
        self.settle();

        Ok(SwapOutcome {
            quote,
            approval_tx,
            swap_tx,
            receipt,
        })
    }

    /// Re-validate the request against a fresh quote, then read the
    /// allowance. UI state may be stale by now.
    async fn precheck(
        &self,
        client: &dyn ContractClient,
        request: &SwapRequest,
    ) -> Result<(Quote, TokenAmount)> {
        if request.amount.is_zero() {
            return Err(AppError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        let quote = self
            .quotes
            .get_quote(client, request.direction, request.amount)
            .await?;
        if !quote.meets_minimum {
            return Err(AppError::BelowMinimum {
                output: quote.output.to_string(),
                minimum: self.quotes.min_output().to_string(),
            });
        }
        let allowance = client
            .allowance(
                request.direction.input_token(),
                request.owner,
                client.swap_contract(),
            )
            .await?;
        Ok((quote, allowance))
    }

    /// Approve the maximum amount once so later swaps skip this step.
    async fn approve(&self, client: &dyn ContractClient, request: &SwapRequest) -> Result<TxHash> {
        let token = request.direction.input_token();
        info!(%token, "[SWAP] approving tokens");
        let tx = client
            .approve(
                token,
                client.swap_contract(),
                TokenAmount::max(token.decimals()),
            )
            .await?;
        client.wait_for_confirmation(tx).await?;
        Ok(tx)
    }
}
