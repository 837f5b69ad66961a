//! Configuration loader and application settings.

use crate::amount::TokenAmount;
use crate::chain::{ConfirmationPolicy, ContractAddresses};
use crate::errors::{AppError, Result};
use crate::models::TOKEN_DECIMALS;
use ethers::types::Address;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SWAP_CONTRACT: &str = "0x37757AD0A16bFa13184507d16f34f043b7A63382";
pub const DEFAULT_USDC_ADDRESS: &str = "0x3600000000000000000000000000000000000000";
pub const DEFAULT_EURC_ADDRESS: &str = "0x89B50855Aa3bE2F677cD6303Cec089B5F319D72a";
/// Arc chain.
pub const DEFAULT_CHAIN_ID: u64 = 5_042_002;

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the chain hosting the pool.
    pub rpc_url: String,
    pub chain_id: u64,
    pub swap_contract: Address,
    pub usdc_address: Address,
    pub eurc_address: Address,
    /// Hex private key of the local wallet, if one is configured.
    pub private_key: Option<String>,
    /// Smallest quote output that may be submitted as a swap.
    pub min_output: TokenAmount,
    pub refresh_interval: Duration,
    pub confirmations: usize,
    pub confirmation_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = lookup("RPC_URL")
            .ok_or_else(|| AppError::Config("set RPC_URL to the chain's HTTP endpoint".into()))?;
        Url::parse(&rpc_url)?;

        let chain_id = parse_or(&lookup, "CHAIN_ID", DEFAULT_CHAIN_ID)?;
        let swap_contract = address_or(&lookup, "SWAP_CONTRACT", DEFAULT_SWAP_CONTRACT)?;
        let usdc_address = address_or(&lookup, "USDC_ADDRESS", DEFAULT_USDC_ADDRESS)?;
        let eurc_address = address_or(&lookup, "EURC_ADDRESS", DEFAULT_EURC_ADDRESS)?;
        let private_key = lookup("PRIVATE_KEY").filter(|k| !k.trim().is_empty());

        let min_output_raw = lookup("MIN_OUTPUT").unwrap_or_else(|| "2.0".into());
        let min_output = TokenAmount::parse(&min_output_raw, TOKEN_DECIMALS)
            .map_err(|e| AppError::Config(format!("MIN_OUTPUT: {e}")))?;

        let refresh_secs: u64 = parse_or(&lookup, "REFRESH_INTERVAL_SECS", 30)?;
        if refresh_secs == 0 {
            return Err(AppError::Config(
                "REFRESH_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        let confirmations = parse_or(&lookup, "CONFIRMATIONS", 1usize)?;
        let timeout_secs: u64 = parse_or(&lookup, "CONFIRMATION_TIMEOUT_SECS", 120)?;

        Ok(Self {
            rpc_url,
            chain_id,
            swap_contract,
            usdc_address,
            eurc_address,
            private_key,
            min_output,
            refresh_interval: Duration::from_secs(refresh_secs),
            confirmations,
            confirmation_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn addresses(&self) -> ContractAddresses {
        ContractAddresses {
            swap: self.swap_contract,
            usdc: self.usdc_address,
            eurc: self.eurc_address,
        }
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations: self.confirmations,
            timeout: self.confirmation_timeout,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn address_or<F>(lookup: &F, key: &str, default: &str) -> Result<Address>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}")))
}
