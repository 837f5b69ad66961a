//! Shared data structures used throughout the application.

use crate::amount::TokenAmount;
use ethers::types::Address;
use serde::Serialize;
use std::fmt;

/// Both pool tokens use six decimals.
pub const TOKEN_DECIMALS: u8 = 6;

/// The two tokens held by the swap pool. USDC is token A, EURC token B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Token {
    Usdc,
    Eurc,
}

impl Token {
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Usdc => "USDC",
            Token::Eurc => "EURC",
        }
    }

    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    pub fn zero(&self) -> TokenAmount {
        TokenAmount::zero(self.decimals())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Direction of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Direction {
    /// A_TO_B: pay USDC, receive EURC.
    #[default]
    UsdcToEurc,
    /// B_TO_A: pay EURC, receive USDC.
    EurcToUsdc,
}

impl Direction {
    pub fn input_token(&self) -> Token {
        match self {
            Direction::UsdcToEurc => Token::Usdc,
            Direction::EurcToUsdc => Token::Eurc,
        }
    }

    pub fn output_token(&self) -> Token {
        match self {
            Direction::UsdcToEurc => Token::Eurc,
            Direction::EurcToUsdc => Token::Usdc,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Direction::UsdcToEurc => Direction::EurcToUsdc,
            Direction::EurcToUsdc => Direction::UsdcToEurc,
        }
    }
}

/// Pool totals held by the swap contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub usdc: TokenAmount,
    pub eurc: TokenAmount,
}

impl PoolSnapshot {
    /// Combined liquidity, counting one EURC as one USDC the way the pool
    /// stats panel always has.
    pub fn total(&self) -> Option<TokenAmount> {
        self.usdc.checked_add(&self.eurc)
    }
}

/// Wallet balances arranged by the active direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletBalances {
    pub input: TokenAmount,
    pub output: TokenAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapButton {
    pub enabled: bool,
    pub label: String,
}

impl SwapButton {
    pub fn disconnected() -> Self {
        Self {
            enabled: false,
            label: "Connect Wallet to Swap".into(),
        }
    }

    pub fn enter_amount() -> Self {
        Self {
            enabled: true,
            label: "Enter Amount".into(),
        }
    }

    pub fn processing() -> Self {
        Self {
            enabled: false,
            label: "Processing...".into(),
        }
    }

    /// Labelled with the amount as the user typed it.
    pub fn swap(amount: &str, token: Token) -> Self {
        Self {
            enabled: true,
            label: format!("Swap {amount} {token}"),
        }
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub connected_address: Option<Address>,
    pub direction: Direction,
    pub input_amount: Option<TokenAmount>,
    /// The input as typed, kept for the swap button label.
    pub input_text: Option<String>,
    pub output_amount: Option<TokenAmount>,
    pub fee: TokenAmount,
    pub balances: Option<WalletBalances>,
    pub pool: Option<PoolSnapshot>,
    pub status: Option<StatusMessage>,
    pub swap_button: SwapButton,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            connected_address: None,
            direction: Direction::default(),
            input_amount: None,
            input_text: None,
            output_amount: None,
            fee: TokenAmount::zero(TOKEN_DECIMALS),
            balances: None,
            pool: None,
            status: None,
            swap_button: SwapButton::disconnected(),
        }
    }
}

impl DisplayState {
    pub fn clear_input(&mut self) {
        self.input_amount = None;
        self.input_text = None;
    }

    /// Drop the quote fields, keeping everything else.
    pub fn clear_quote(&mut self) {
        self.output_amount = None;
        self.fee = self.direction.output_token().zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    #[test]
    fn direction_maps_tokens() {
        let d = Direction::UsdcToEurc;
        assert_eq!(d.input_token(), Token::Usdc);
        assert_eq!(d.output_token(), Token::Eurc);
        assert_eq!(d.toggled(), Direction::EurcToUsdc);
        assert_eq!(d.toggled().toggled(), d);
    }

    #[test]
    fn pool_total_sums_both_sides() {
        let pool = PoolSnapshot {
            usdc: TokenAmount::new(U256::from(1_500_000u64), TOKEN_DECIMALS),
            eurc: TokenAmount::new(U256::from(2_500_000u64), TOKEN_DECIMALS),
        };
        assert_eq!(pool.total().unwrap().to_string(), "4.0");
    }

    #[test]
    fn default_display_is_disconnected() {
        let state = DisplayState::default();
        assert!(state.connected_address.is_none());
        assert!(!state.swap_button.enabled);
        assert_eq!(state.swap_button.label, "Connect Wallet to Swap");
    }
}
