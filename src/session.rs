//! Session state and the operations the presentation layer triggers.
//!
//! `SwapApp` owns the session and the display state through `watch`
//! channels. Every operation catches its own errors, turns them into a
//! status message and logs them; the `Result` is returned as well so a
//! caller can pick an exit code.

use crate::amount::TokenAmount;
use crate::chain::ContractClient;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::{Direction, DisplayState, StatusMessage, SwapButton, TOKEN_DECIMALS};
use crate::quote::{Quote, QuoteEngine};
use crate::refresher::{Refresher, spawn_refresh_watcher};
use crate::swap::{SwapOrchestrator, SwapOutcome, SwapPhase, SwapRequest};
use crate::wallet::WalletConnector;
use ethers::types::Address;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Account bound to a signing context.
#[derive(Clone)]
pub struct AccountBinding {
    pub address: Address,
    pub client: Arc<dyn ContractClient>,
}

impl fmt::Debug for AccountBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountBinding")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub direction: Direction,
    pub binding: Option<AccountBinding>,
}

impl Session {
    pub fn connected_address(&self) -> Option<Address> {
        self.binding.as_ref().map(|b| b.address)
    }
}

pub struct SwapApp {
    connector: WalletConnector,
    session: Arc<watch::Sender<Session>>,
    display: Arc<watch::Sender<DisplayState>>,
    quotes: QuoteEngine,
    orchestrator: SwapOrchestrator,
    refresher: Refresher,
    refresh_interval: Duration,
}

impl SwapApp {
    pub fn new(connector: WalletConnector, min_output: TokenAmount, refresh_interval: Duration) -> Self {
        let (session, _) = watch::channel(Session::default());
        let display = Arc::new(watch::channel(DisplayState::default()).0);
        let quotes = QuoteEngine::new(min_output);
        Self {
            connector,
            session: Arc::new(session),
            refresher: Refresher::new(display.clone()),
            display,
            quotes,
            orchestrator: SwapOrchestrator::new(quotes),
            refresh_interval,
        }
    }

    pub fn from_config(config: &AppConfig, connector: WalletConnector) -> Self {
        Self::new(connector, config.min_output, config.refresh_interval)
    }

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn display(&self) -> DisplayState {
        self.display.borrow().clone()
    }

    pub fn subscribe_display(&self) -> watch::Receiver<DisplayState> {
        self.display.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SwapPhase> {
        self.orchestrator.subscribe()
    }

    fn binding(&self) -> Result<AccountBinding> {
        self.session.borrow().binding.clone().ok_or(AppError::NotConnected)
    }

    fn status(&self, status: StatusMessage) {
        self.display.send_modify(|state| state.status = Some(status));
    }

    fn report(&self, context: &str, err: &AppError) {
        error!(error = %err, "{context}");
        self.status(StatusMessage::error(err.to_string()));
    }

    /// Connect the wallet, bind contracts and load balances and pool.
    pub async fn connect(&self) -> Result<Address> {
        let connection = match self.connector.connect().await {
            Ok(c) => c,
            Err(e) => {
                let message = match &e {
                    AppError::NoWallet => "Please install or configure a wallet".to_string(),
                    AppError::UserRejected => "Wallet connection was declined".to_string(),
                    _ => "Failed to connect wallet".to_string(),
                };
                error!(error = %e, "[WALLET] connection error");
                self.status(StatusMessage::error(message));
                return Err(e);
            }
        };
        self.bind(AccountBinding {
            address: connection.address,
            client: connection.client,
        })
        .await;
        self.status(StatusMessage::success("Wallet connected successfully!"));
        Ok(connection.address)
    }

    async fn bind(&self, binding: AccountBinding) {
        let address = binding.address;
        let direction = self.session.borrow().direction;
        self.session.send_modify(|s| s.binding = Some(binding.clone()));
        self.display.send_modify(|state| {
            state.connected_address = Some(address);
            state.clear_input();
            state.balances = None;
            state.clear_quote();
            state.swap_button = SwapButton::enter_amount();
        });
        self.refresher.publish_all(&binding, direction).await;
    }

    fn disconnect(&self) {
        self.session.send_modify(|s| s.binding = None);
        self.display.send_modify(|state| {
            state.connected_address = None;
            state.balances = None;
            state.clear_input();
            state.clear_quote();
            state.swap_button = SwapButton::disconnected();
        });
        info!("[WALLET] disconnected");
    }

    /// React to an account-change notification.
    ///
    /// An empty list clears the session. A new account gets freshly bound
    /// contracts; an attempt already in flight keeps the handle it started
    /// with.
    pub async fn handle_accounts_changed(&self, accounts: &[Address]) -> Result<()> {
        let Some(&next) = accounts.first() else {
            self.disconnect();
            return Ok(());
        };
        if self.session.borrow().connected_address() == Some(next) {
            return Ok(());
        }
        info!(account = ?next, "[WALLET] account changed, rebinding contracts");
        match self.connector.bind(next).await {
            Ok(connection) => {
                self.bind(AccountBinding {
                    address: connection.address,
                    client: connection.client,
                })
                .await;
                Ok(())
            }
            Err(e) => {
                self.report("[WALLET] rebinding failed", &e);
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Listen for account changes until the provider goes away.
    pub fn spawn_account_listener(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let mut rx = self.connector.subscribe()?;
        let app = Arc::clone(self);
        Some(tokio::spawn(async move {
            rx.borrow_and_update();
            while rx.changed().await.is_ok() {
                let accounts = rx.borrow_and_update().clone();
                let _ = app.handle_accounts_changed(&accounts).await;
            }
        }))
    }

    pub fn spawn_refresh_watcher(&self) -> tokio::task::JoinHandle<()> {
        spawn_refresh_watcher(
            self.session.subscribe(),
            self.refresher.clone(),
            self.refresh_interval,
        )
    }

    pub async fn set_direction(&self, direction: Direction) {
        self.session.send_modify(|s| s.direction = direction);
        self.display.send_modify(|state| {
            state.direction = direction;
            state.balances = None;
            state.clear_quote();
        });
        let input = {
            let state = self.display.borrow();
            state.input_amount.zip(state.input_text.clone())
        };
        if let Some((input, text)) = input {
            let _ = self.requote(input, &text).await;
        }
        if let Ok(binding) = self.binding() {
            self.refresher
                .publish_balances(binding.client.as_ref(), binding.address, direction)
                .await;
        }
    }

    pub async fn toggle_direction(&self) {
        let next = self.session.borrow().direction.toggled();
        self.set_direction(next).await;
    }

    /// New text in the input box: parse it and re-quote.
    ///
    /// Empty, zero, unparsable input or no connected wallet clears the
    /// output without a remote call.
    pub async fn update_input(&self, text: &str) -> Result<Quote> {
        let direction = self.session.borrow().direction;
        let input = match TokenAmount::parse(text, TOKEN_DECIMALS) {
            Ok(amount) if !amount.is_zero() => amount,
            _ => {
                self.display.send_modify(|state| {
                    state.clear_input();
                    state.clear_quote();
                    if state.connected_address.is_some() {
                        state.swap_button = SwapButton::enter_amount();
                    }
                });
                return Ok(Quote::empty(direction));
            }
        };
        let text = text.trim();
        self.display.send_modify(|state| {
            state.input_amount = Some(input);
            state.input_text = Some(text.to_string());
        });
        if self.session.borrow().binding.is_none() {
            self.display.send_modify(DisplayState::clear_quote);
            return Ok(Quote::empty(direction));
        }
        self.requote(input, text).await
    }

    async fn requote(&self, input: TokenAmount, text: &str) -> Result<Quote> {
        let binding = self.binding()?;
        let direction = self.session.borrow().direction;
        match self
            .quotes
            .get_quote(binding.client.as_ref(), direction, input)
            .await
        {
            Ok(quote) => {
                let button = self.quotes.swap_button(&quote, direction, text);
                self.display.send_modify(|state| {
                    if state.direction != direction || state.input_amount != Some(input) {
                        return;
                    }
                    state.output_amount = Some(quote.output);
                    state.fee = quote.fee;
                    state.swap_button = button;
                });
                Ok(quote)
            }
            Err(e) => {
                warn!(error = %e, "[QUOTE] quote error");
                self.display.send_modify(|state| state.output_amount = None);
                Err(e)
            }
        }
    }

    /// Swap the amount currently in the input box.
    pub async fn submit_swap(&self) -> Result<SwapOutcome> {
        let binding = match self.binding() {
            Ok(b) => b,
            Err(e) => {
                self.report("[SWAP] swap requested without a wallet", &e);
                return Err(e);
            }
        };
        let direction = self.session.borrow().direction;
        let input = {
            let state = self.display.borrow();
            state.input_amount.zip(state.input_text.clone())
        };
        let Some((amount, text)) = input else {
            let e = AppError::InvalidAmount("please enter a valid amount".into());
            self.status(StatusMessage::error("Please enter a valid amount"));
            return Err(e);
        };

        self.display
            .send_modify(|state| state.swap_button = SwapButton::processing());
        let request = SwapRequest {
            owner: binding.address,
            direction,
            amount,
        };

        let mut phases = self.orchestrator.subscribe();
        let display = self.display.clone();
        let progress = tokio::spawn(async move {
            while phases.changed().await.is_ok() {
                let message = match *phases.borrow_and_update() {
                    SwapPhase::Approving => "Approving tokens...",
                    SwapPhase::Swapping => "Swapping tokens...",
                    _ => continue,
                };
                display.send_modify(|state| state.status = Some(StatusMessage::success(message)));
            }
        });

        let result = self
            .orchestrator
            .execute(binding.client.as_ref(), request, &self.refresher)
            .await;
        progress.abort();

        // The account may have changed or gone while the attempt ran. The
        // form then belongs to the new binding and is left alone.
        let owner = Some(binding.address);
        match &result {
            Ok(_) => self.display.send_modify(|state| {
                state.status = Some(StatusMessage::success("Swap successful!"));
                if state.connected_address == owner {
                    state.clear_input();
                    state.clear_quote();
                    state.swap_button = SwapButton::enter_amount();
                }
            }),
            Err(AppError::SwapInProgress) => {
                // The running attempt owns the button.
                self.status(StatusMessage::error(AppError::SwapInProgress.to_string()));
            }
            Err(e) => {
                error!(error = %e, "[SWAP] swap error");
                self.display.send_modify(|state| {
                    state.status = Some(StatusMessage::error(e.reason()));
                    if state.connected_address == owner {
                        state.swap_button = SwapButton::swap(&text, direction.input_token());
                    }
                });
            }
        }
        result
    }

    /// On-demand refresh of pool and balances.
    pub async fn refresh(&self) {
        let direction = self.session.borrow().direction;
        if let Ok(binding) = self.binding() {
            self.refresher.publish_all(&binding, direction).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::stub::{Failure, StubContractClient};
    use crate::models::{PoolSnapshot, StatusKind, Token};
    use crate::wallet::stub::StubWalletProvider;
    use ethers::types::U256;

    const A: u64 = 0xa;
    const B: u64 = 0xb;

    fn app_with(provider: Option<Arc<StubWalletProvider>>) -> Arc<SwapApp> {
        let connector = WalletConnector::new(provider.map(|p| p as Arc<dyn crate::wallet::WalletProvider>));
        Arc::new(SwapApp::new(
            connector,
            TokenAmount::parse("2.0", TOKEN_DECIMALS).unwrap(),
            Duration::from_secs(30),
        ))
    }

    fn connected() -> (Arc<SwapApp>, Arc<StubWalletProvider>, Arc<StubContractClient>) {
        let stub = StubContractClient::new();
        let provider = StubWalletProvider::new(
            vec![Address::from_low_u64_be(A)],
            stub.clone(),
        );
        (app_with(Some(provider.clone())), provider, stub)
    }

    #[tokio::test]
    async fn connect_loads_balances_and_pool() {
        let (app, _, stub) = connected();
        let address = app.connect().await.unwrap();
        assert_eq!(address, Address::from_low_u64_be(A));

        let state = app.display();
        assert_eq!(state.connected_address, Some(address));
        assert_eq!(state.balances.unwrap().input.to_string(), "100.0");
        assert_eq!(state.pool.unwrap().total().unwrap().to_string(), "18000.0");
        assert_eq!(state.swap_button, SwapButton::enter_amount());
        assert_eq!(state.status.unwrap().kind, StatusKind::Success);
        assert_eq!(stub.count("pool_balances"), 1);
    }

    #[tokio::test]
    async fn connect_without_wallet_reports_error() {
        let app = app_with(None);
        assert!(matches!(app.connect().await, Err(AppError::NoWallet)));
        let status = app.display().status.unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert!(app.session().binding.is_none());
    }

    #[tokio::test]
    async fn zero_input_clears_quote_without_remote_call() {
        let (app, _, stub) = connected();
        app.connect().await.unwrap();
        let quote = app.update_input("0").await.unwrap();
        assert!(quote.is_empty());
        assert!(app.display().output_amount.is_none());
        assert_eq!(stub.count("quote"), 0);
    }

    #[tokio::test]
    async fn small_input_disables_swap() {
        let (app, _, _) = connected();
        app.connect().await.unwrap();
        app.update_input("1.5").await.unwrap();
        let state = app.display();
        assert!(state.output_amount.is_some());
        assert!(!state.swap_button.enabled);
        assert_eq!(state.swap_button.label, "Amount too small (min 2 tokens)");
    }

    #[tokio::test]
    async fn quote_failure_clears_output_and_keeps_running() {
        let (app, _, stub) = connected();
        app.connect().await.unwrap();
        app.update_input("10").await.unwrap();
        assert!(app.display().output_amount.is_some());

        stub.fail("quote", Failure::Remote);
        assert!(app.update_input("12").await.is_err());
        assert!(app.display().output_amount.is_none());
        assert!(app.display().connected_address.is_some());
    }

    #[tokio::test]
    async fn input_without_wallet_is_not_quoted() {
        let app = app_with(None);
        let quote = app.update_input("10").await.unwrap();
        assert!(quote.is_empty());
        assert_eq!(app.display().swap_button, SwapButton::disconnected());
    }

    #[tokio::test]
    async fn toggle_swaps_balances_and_requotes() {
        let (app, _, stub) = connected();
        app.connect().await.unwrap();
        app.update_input("10").await.unwrap();
        app.toggle_direction().await;

        let state = app.display();
        assert_eq!(state.direction, Direction::EurcToUsdc);
        assert_eq!(state.balances.unwrap().input.to_string(), "50.0");
        assert_eq!(state.swap_button.label, "Swap 10 EURC");
        assert_eq!(stub.count("quote"), 2);
    }

    #[tokio::test]
    async fn successful_swap_resets_form() {
        let (app, _, stub) = connected();
        app.connect().await.unwrap();
        app.update_input("5").await.unwrap();
        let outcome = app.submit_swap().await.unwrap();
        assert!(outcome.approval_tx.is_some());

        let state = app.display();
        assert!(state.input_amount.is_none());
        assert!(state.output_amount.is_none());
        assert_eq!(state.swap_button, SwapButton::enter_amount());
        assert_eq!(state.status.unwrap().text, "Swap successful!");
        assert_eq!(stub.count("approve"), 1);

        // Approve-once: the next swap skips approval.
        app.update_input("5").await.unwrap();
        let again = app.submit_swap().await.unwrap();
        assert!(again.approval_tx.is_none());
        assert_eq!(stub.count("approve"), 1);
    }

    #[tokio::test]
    async fn failed_swap_restores_button_and_shows_reason() {
        let (app, _, stub) = connected();
        stub.set_allowance(Token::Usdc, U256::MAX);
        stub.fail("submit_swap", Failure::Revert("Contract is paused"));
        app.connect().await.unwrap();
        app.update_input("5").await.unwrap();

        assert!(app.submit_swap().await.is_err());
        let state = app.display();
        assert_eq!(state.status.unwrap().text, "Contract is paused");
        assert_eq!(state.swap_button.label, "Swap 5 USDC");
        assert!(state.swap_button.enabled);
    }

    #[tokio::test]
    async fn empty_account_list_disconnects() {
        let (app, _, _) = connected();
        app.connect().await.unwrap();
        app.handle_accounts_changed(&[]).await.unwrap();

        assert!(app.session().binding.is_none());
        let state = app.display();
        assert!(state.connected_address.is_none());
        assert_eq!(state.swap_button, SwapButton::disconnected());
    }

    #[tokio::test]
    async fn new_account_rebinds_contracts() {
        let (app, provider, _) = connected();
        app.connect().await.unwrap();
        let b = Address::from_low_u64_be(B);
        app.handle_accounts_changed(&[b]).await.unwrap();

        assert_eq!(app.session().connected_address(), Some(b));
        assert_eq!(app.display().connected_address, Some(b));
        assert_eq!(
            *provider.bound.lock().unwrap(),
            vec![Address::from_low_u64_be(A), b]
        );
    }

    #[tokio::test]
    async fn account_listener_applies_notifications() {
        let (app, provider, _) = connected();
        app.connect().await.unwrap();
        let handle = app.spawn_account_listener().unwrap();
        let mut display = app.subscribe_display();

        provider.announce(Vec::new());
        display
            .wait_for(|s| s.connected_address.is_none())
            .await
            .unwrap();
        assert!(app.session().binding.is_none());
        handle.abort();
    }

    #[tokio::test]
    async fn revoked_account_keeps_disconnected_form_after_swap() {
        let (app, _, stub) = connected();
        stub.set_allowance(Token::Usdc, U256::MAX);
        let gate = stub.hold("wait_for_confirmation");
        app.connect().await.unwrap();
        app.update_input("5").await.unwrap();

        let mut phases = app.subscribe_phase();
        let swap = {
            let app = app.clone();
            tokio::spawn(async move { app.submit_swap().await })
        };
        phases.wait_for(|p| *p == SwapPhase::Confirming).await.unwrap();

        app.handle_accounts_changed(&[]).await.unwrap();
        gate.notify_one();
        swap.await.unwrap().unwrap();

        let state = app.display();
        assert!(state.connected_address.is_none());
        assert_eq!(state.swap_button, SwapButton::disconnected());
        assert!(state.balances.is_none());
    }

    #[tokio::test]
    async fn failed_swap_after_revoke_keeps_disconnected_button() {
        let (app, _, stub) = connected();
        stub.set_allowance(Token::Usdc, U256::MAX);
        stub.fail("wait_for_confirmation", Failure::Revert("Contract is paused"));
        let gate = stub.hold("wait_for_confirmation");
        app.connect().await.unwrap();
        app.update_input("5").await.unwrap();

        let mut phases = app.subscribe_phase();
        let swap = {
            let app = app.clone();
            tokio::spawn(async move { app.submit_swap().await })
        };
        phases.wait_for(|p| *p == SwapPhase::Confirming).await.unwrap();

        app.handle_accounts_changed(&[]).await.unwrap();
        gate.notify_one();
        assert!(swap.await.unwrap().is_err());

        let state = app.display();
        assert_eq!(state.swap_button, SwapButton::disconnected());
        assert_eq!(state.status.unwrap().text, "Contract is paused");
    }

    #[tokio::test]
    async fn refresh_runs_while_swap_is_confirming() {
        let (app, _, stub) = connected();
        stub.set_allowance(Token::Usdc, U256::MAX);
        let gate = stub.hold("wait_for_confirmation");
        app.connect().await.unwrap();
        app.update_input("5").await.unwrap();

        let mut phases = app.subscribe_phase();
        let swap = {
            let app = app.clone();
            tokio::spawn(async move { app.submit_swap().await })
        };
        phases.wait_for(|p| *p == SwapPhase::Confirming).await.unwrap();

        let drained = PoolSnapshot {
            usdc: TokenAmount::parse("9000", TOKEN_DECIMALS).unwrap(),
            eurc: TokenAmount::parse("7000", TOKEN_DECIMALS).unwrap(),
        };
        *stub.pool.lock().unwrap() = drained;
        app.refresh().await;

        assert_eq!(*phases.borrow(), SwapPhase::Confirming);
        assert_eq!(app.display().pool, Some(drained));
        assert_eq!(app.display().swap_button, SwapButton::processing());

        gate.notify_one();
        swap.await.unwrap().unwrap();
        assert_eq!(*phases.borrow(), SwapPhase::Idle);
    }

    #[tokio::test]
    async fn swap_label_uses_typed_text() {
        let (app, _, _) = connected();
        app.connect().await.unwrap();
        app.update_input(" 2.50 ").await.unwrap();
        let state = app.display();
        assert_eq!(state.input_text.as_deref(), Some("2.50"));
        assert_eq!(state.swap_button.label, "Swap 2.50 USDC");
    }
}
