//! Fixed-point token amounts.
//!
//! On-chain amounts are integers scaled by the token's decimal count. All
//! conversions to and from human-readable strings are exact: nothing here
//! goes through floating point.

use crate::errors::{AppError, Result};
use bigdecimal::BigDecimal;
use ethers::types::U256;
use num_bigint::BigInt;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Digits of `U256::MAX`. Longer whole parts cannot fit at any scale.
const MAX_WHOLE_DIGITS: usize = 78;

/// Integer amount in a token's smallest unit, tagged with its decimal scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(U256::zero(), decimals)
    }

    /// Largest representable amount; used for approve-once allowances.
    pub fn max(decimals: u8) -> Self {
        Self::new(U256::MAX, decimals)
    }

    /// Parse a decimal string such as `"1.5"` into smallest units.
    ///
    /// Only plain decimal notation is accepted: no sign, no exponent. Rejects
    /// more fractional digits than `decimals` allows and anything that does
    /// not fit in 256 bits.
    pub fn parse(input: &str, decimals: u8) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidAmount("amount is empty".into()));
        }
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let plain = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !plain(whole) || !plain(frac) {
            return Err(AppError::InvalidAmount(format!(
                "{trimmed:?} is not a plain decimal number"
            )));
        }
        if whole.trim_start_matches('0').len() > MAX_WHOLE_DIGITS {
            return Err(AppError::InvalidAmount(format!("{trimmed} is out of range")));
        }

        let value = BigDecimal::from_str(trimmed)
            .map_err(|e| AppError::InvalidAmount(format!("{trimmed:?}: {e}")))?;

        let (digits, scale) = value.normalized().as_bigint_and_exponent();
        if scale > decimals as i64 {
            return Err(AppError::InvalidAmount(format!(
                "{trimmed} has more than {decimals} decimal places"
            )));
        }
        let shift = u32::try_from(decimals as i64 - scale)
            .map_err(|_| AppError::InvalidAmount(format!("{trimmed} is out of range")))?;
        let scaled: BigInt = digits * BigInt::from(10u8).pow(shift);

        let raw = U256::from_dec_str(&scaled.to_string())
            .map_err(|_| AppError::InvalidAmount(format!("{trimmed} is out of range")))?;
        Ok(Self::new(raw, decimals))
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Sum of two amounts at the same scale; `None` on overflow or when the
    /// scales differ.
    pub fn checked_add(&self, other: &TokenAmount) -> Option<TokenAmount> {
        if self.decimals != other.decimals {
            return None;
        }
        self.raw
            .checked_add(other.raw)
            .map(|raw| Self::new(raw, self.decimals))
    }

    /// Exact decimal value for presentation.
    pub fn to_decimal(&self) -> BigDecimal {
        let digits = BigInt::parse_bytes(self.raw.to_string().as_bytes(), 10).unwrap_or_default();
        BigDecimal::new(digits, self.decimals as i64)
    }
}

impl fmt::Display for TokenAmount {
    /// Formats like `1.5`, `2.0` or `0.000001`: trailing zeros are trimmed
    /// but one fractional digit always remains.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.raw.to_string();
        let decimals = self.decimals as usize;
        if decimals == 0 {
            return write!(f, "{digits}.0");
        }
        let padded = format!("{digits:0>width$}", width = decimals + 1);
        let (whole, frac) = padded.split_at(padded.len() - decimals);
        let frac = frac.trim_end_matches('0');
        let frac = if frac.is_empty() { "0" } else { frac };
        write!(f, "{whole}.{frac}")
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
