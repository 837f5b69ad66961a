//! Wallet access and signing contexts.
//!
//! A `WalletProvider` stands in for the injected browser wallet: it grants
//! account access, reports account changes and creates signing contexts.
//! The shipped provider signs with local keys.

use crate::chain::{ContractClient, EthersContractClient};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::utils::SharedLines;
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::info;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask for account access. The active account comes first.
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Notifications of account changes. An empty list means access was
    /// withdrawn.
    fn accounts_changed(&self) -> watch::Receiver<Vec<Address>>;

    /// Contract client whose transactions are signed by `account`.
    async fn signing_client(&self, account: Address) -> Result<Arc<dyn ContractClient>>;
}

/// How the local wallet answers access requests.
#[derive(Debug, Clone)]
pub enum AccessPolicy {
    AutoApprove,
    /// Ask on the terminal, reading the answer from the given lines;
    /// anything but `y`/`yes` declines.
    Prompt(SharedLines),
}

/// Wallet holding one or more private keys from `PRIVATE_KEY`
/// (comma-separated).
pub struct LocalWalletProvider {
    provider: Provider<Http>,
    wallets: Vec<LocalWallet>,
    active: AtomicUsize,
    config: AppConfig,
    access: AccessPolicy,
    accounts_tx: watch::Sender<Vec<Address>>,
}

impl LocalWalletProvider {
    /// `None` when no key is configured, which callers surface as
    /// `NoWallet`.
    pub fn from_config(config: &AppConfig, access: AccessPolicy) -> Result<Option<Self>> {
        let Some(keys) = config.private_key.as_deref() else {
            return Ok(None);
        };
        let wallets = keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| {
                k.parse::<LocalWallet>()
                    .map(|w| w.with_chain_id(config.chain_id))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if wallets.is_empty() {
            return Ok(None);
        }

        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?;
        let accounts = wallets.iter().map(Signer::address).collect();
        let (accounts_tx, _) = watch::channel(accounts);
        Ok(Some(Self {
            provider,
            wallets,
            active: AtomicUsize::new(0),
            config: config.clone(),
            access,
            accounts_tx,
        }))
    }

    fn ordered_accounts(&self) -> Vec<Address> {
        let active = self.active.load(Ordering::SeqCst);
        let mut accounts: Vec<Address> = self.wallets.iter().map(Signer::address).collect();
        accounts.rotate_left(active);
        accounts
    }

    /// Make the key at `index` the active account and notify listeners.
    pub fn switch_account(&self, index: usize) -> Result<Address> {
        if index >= self.wallets.len() {
            return Err(AppError::Config(format!(
                "account index {index} out of range (have {})",
                self.wallets.len()
            )));
        }
        self.active.store(index, Ordering::SeqCst);
        let accounts = self.ordered_accounts();
        let address = accounts[0];
        self.accounts_tx.send_replace(accounts);
        info!(account = ?address, "[WALLET] active account switched");
        Ok(address)
    }

    /// Withdraw access from every account.
    pub fn revoke(&self) {
        self.accounts_tx.send_replace(Vec::new());
        info!("[WALLET] account access revoked");
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let accounts = self.ordered_accounts();
        if let AccessPolicy::Prompt(lines) = &self.access {
            if !prompt_for_access(accounts[0], lines).await? {
                return Err(AppError::UserRejected);
            }
        }
        Ok(accounts)
    }

    fn accounts_changed(&self) -> watch::Receiver<Vec<Address>> {
        self.accounts_tx.subscribe()
    }

    async fn signing_client(&self, account: Address) -> Result<Arc<dyn ContractClient>> {
        let wallet = self
            .wallets
            .iter()
            .find(|w| w.address() == account)
            .cloned()
            .ok_or(AppError::NotConnected)?;
        let signer = SignerMiddleware::new(self.provider.clone(), wallet);
        Ok(Arc::new(EthersContractClient::new(
            Arc::new(signer),
            self.config.addresses(),
            self.config.confirmation_policy(),
        )))
    }
}

async fn prompt_for_access(account: Address, lines: &SharedLines) -> Result<bool> {
    let mut stderr = tokio::io::stderr();
    stderr
        .write_all(format!("Allow stableswap to use account {account:?}? [y/N] ").as_bytes())
        .await?;
    stderr.flush().await?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Account and signing context produced by a successful connection.
#[derive(Clone)]
pub struct Connection {
    pub address: Address,
    pub client: Arc<dyn ContractClient>,
}

/// Front door to the wallet: connection and re-binding.
#[derive(Clone)]
pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl WalletConnector {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>> {
        self.provider.as_ref().ok_or(AppError::NoWallet)
    }

    /// Request access and bind a signing context to the first account.
    pub async fn connect(&self) -> Result<Connection> {
        let provider = self.provider()?;
        let accounts = provider.request_accounts().await?;
        let address = *accounts.first().ok_or(AppError::UserRejected)?;
        let client = provider.signing_client(address).await?;
        info!(account = ?address, "[WALLET] connected");
        Ok(Connection { address, client })
    }

    /// Bind a fresh signing context for an account reported by a change
    /// notification.
    pub async fn bind(&self, address: Address) -> Result<Connection> {
        let client = self.provider()?.signing_client(address).await?;
        Ok(Connection { address, client })
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<Vec<Address>>> {
        self.provider.as_ref().map(|p| p.accounts_changed())
    }
}
