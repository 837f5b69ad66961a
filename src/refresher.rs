//! Balance and pool refresh.
//!
//! Refreshes are read-only and idempotent. A failed refresh is logged and
//! leaves the displayed values as they were.

use crate::chain::ContractClient;
use crate::errors::Result;
use crate::models::{Direction, DisplayState, PoolSnapshot, Token, WalletBalances};
use crate::session::{AccountBinding, Session};
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Refresher {
    display: Arc<watch::Sender<DisplayState>>,
}

impl Refresher {
    pub fn new(display: Arc<watch::Sender<DisplayState>>) -> Self {
        Self { display }
    }

    /// Wallet balances of both tokens, arranged by `direction`. Each
    /// token's balance is read once.
    pub async fn refresh_balances(
        &self,
        client: &dyn ContractClient,
        owner: Address,
        direction: Direction,
    ) -> Result<WalletBalances> {
        let (usdc, eurc) = futures::try_join!(
            client.balance_of(Token::Usdc, owner),
            client.balance_of(Token::Eurc, owner)
        )?;
        Ok(match direction {
            Direction::UsdcToEurc => WalletBalances {
                input: usdc,
                output: eurc,
            },
            Direction::EurcToUsdc => WalletBalances {
                input: eurc,
                output: usdc,
            },
        })
    }

    pub async fn refresh_pool(&self, client: &dyn ContractClient) -> Result<PoolSnapshot> {
        client.pool_balances().await
    }

    /// Refresh balances into the display state. Results are dropped if the
    /// account or direction changed while the reads were in flight.
    pub async fn publish_balances(
        &self,
        client: &dyn ContractClient,
        owner: Address,
        direction: Direction,
    ) {
        match self.refresh_balances(client, owner, direction).await {
            Ok(balances) => {
                self.display.send_if_modified(|state| {
                    if state.connected_address != Some(owner) || state.direction != direction {
                        return false;
                    }
                    let changed = state.balances != Some(balances);
                    state.balances = Some(balances);
                    changed
                });
                debug!(input = %balances.input, output = %balances.output, "[REFRESH] balances updated");
            }
            Err(e) => warn!(error = %e, "[REFRESH] balance update failed"),
        }
    }

    pub async fn publish_pool(&self, client: &dyn ContractClient) {
        match self.refresh_pool(client).await {
            Ok(pool) => {
                self.display.send_if_modified(|state| {
                    let changed = state.pool != Some(pool);
                    state.pool = Some(pool);
                    changed
                });
                debug!(usdc = %pool.usdc, eurc = %pool.eurc, "[REFRESH] pool updated");
            }
            Err(e) => warn!(error = %e, "[REFRESH] pool stats update failed"),
        }
    }

    pub async fn publish_all(&self, binding: &AccountBinding, direction: Direction) {
        self.publish_pool(binding.client.as_ref()).await;
        self.publish_balances(binding.client.as_ref(), binding.address, direction)
            .await;
    }
}

/// Spawn a background task that refreshes pool and balances every
/// `interval` while a session is bound. Ends when the session channel
/// closes.
pub fn spawn_refresh_watcher(
    mut session_rx: watch::Receiver<Session>,
    refresher: Refresher,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; connecting already refreshed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if session_rx.has_changed().is_err() {
                debug!("[REFRESH] session closed, stopping watcher");
                break;
            }
            let session = session_rx.borrow_and_update().clone();
            let Some(binding) = session.binding else {
                continue;
            };
            refresher.publish_all(&binding, session.direction).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::stub::{Failure, StubContractClient};
    use ethers::types::U256;

    fn display_for(owner: Address) -> Arc<watch::Sender<DisplayState>> {
        let (tx, _) = watch::channel(DisplayState {
            connected_address: Some(owner),
            ..DisplayState::default()
        });
        Arc::new(tx)
    }

    #[tokio::test]
    async fn balances_follow_direction_with_one_read_per_token() {
        let stub = StubContractClient::new();
        let owner = Address::from_low_u64_be(9);
        let refresher = Refresher::new(display_for(owner));

        let forward = refresher
            .refresh_balances(stub.as_ref(), owner, Direction::UsdcToEurc)
            .await
            .unwrap();
        assert_eq!(forward.input.to_string(), "100.0");
        assert_eq!(forward.output.to_string(), "50.0");
        assert_eq!(stub.count("balance_of"), 2);

        let reverse = refresher
            .refresh_balances(stub.as_ref(), owner, Direction::EurcToUsdc)
            .await
            .unwrap();
        assert_eq!(reverse.input, forward.output);
        assert_eq!(reverse.output, forward.input);
        assert_eq!(stub.count("balance_of"), 4);
    }

    #[tokio::test]
    async fn pool_refresh_is_idempotent() {
        let stub = StubContractClient::new();
        let refresher = Refresher::new(display_for(Address::zero()));
        let first = refresher.refresh_pool(stub.as_ref()).await.unwrap();
        let second = refresher.refresh_pool(stub.as_ref()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total().unwrap().to_string(), "18000.0");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_values() {
        let stub = StubContractClient::new();
        let owner = Address::from_low_u64_be(9);
        let display = display_for(owner);
        let refresher = Refresher::new(display.clone());

        refresher.publish_pool(stub.as_ref()).await;
        refresher
            .publish_balances(stub.as_ref(), owner, Direction::UsdcToEurc)
            .await;
        let before = display.borrow().clone();
        assert!(before.pool.is_some());
        assert!(before.balances.is_some());

        stub.fail("pool_balances", Failure::Remote);
        stub.fail("balance_of", Failure::Decode);
        *stub.pool.lock().unwrap() = PoolSnapshot {
            usdc: Token::Usdc.zero(),
            eurc: Token::Eurc.zero(),
        };
        refresher.publish_pool(stub.as_ref()).await;
        refresher
            .publish_balances(stub.as_ref(), owner, Direction::UsdcToEurc)
            .await;
        assert_eq!(*display.borrow(), before);
    }

    #[tokio::test]
    async fn balances_for_stale_direction_are_dropped() {
        let stub = StubContractClient::new();
        let owner = Address::from_low_u64_be(9);
        let display = display_for(owner);
        let refresher = Refresher::new(display.clone());
        refresher
            .publish_balances(stub.as_ref(), owner, Direction::EurcToUsdc)
            .await;
        assert!(display.borrow().balances.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_refreshes_only_while_bound() {
        let stub = StubContractClient::new();
        let owner = Address::from_low_u64_be(9);
        let display = display_for(owner);
        let (session_tx, session_rx) = watch::channel(Session::default());
        let handle = spawn_refresh_watcher(
            session_rx,
            Refresher::new(display.clone()),
            Duration::from_secs(30),
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(stub.count("pool_balances"), 0);

        session_tx.send_modify(|s| {
            s.binding = Some(AccountBinding {
                address: owner,
                client: stub.clone(),
            })
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(stub.count("pool_balances"), 1);
        assert_eq!(stub.count("balance_of"), 2);
        assert_eq!(
            display.borrow().balances.unwrap().input.raw(),
            U256::from(100_000_000u64)
        );

        drop(session_tx);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.is_finished());
    }
}
