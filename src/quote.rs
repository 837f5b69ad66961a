//! Quote engine: asks the pool what an input amount is worth.

use crate::amount::TokenAmount;
use crate::chain::ContractClient;
use crate::errors::Result;
use crate::models::{Direction, SwapButton};
use serde::Serialize;
use tracing::debug;

/// Output and fee for an input amount, in the output token's units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub input: TokenAmount,
    pub output: TokenAmount,
    pub fee: TokenAmount,
    /// Whether `output` reaches the configured minimum. Swaps are blocked
    /// otherwise.
    pub meets_minimum: bool,
}

impl Quote {
    /// Quote for a zero or missing input.
    pub fn empty(direction: Direction) -> Self {
        Self {
            input: direction.input_token().zero(),
            output: direction.output_token().zero(),
            fee: direction.output_token().zero(),
            meets_minimum: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_zero()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuoteEngine {
    min_output: TokenAmount,
}

impl QuoteEngine {
    pub fn new(min_output: TokenAmount) -> Self {
        Self { min_output }
    }

    pub fn min_output(&self) -> TokenAmount {
        self.min_output
    }

    /// Fetch a quote for `input` in `direction`.
    ///
    /// A zero input returns [`Quote::empty`] without a remote call.
    pub async fn get_quote(
        &self,
        client: &dyn ContractClient,
        direction: Direction,
        input: TokenAmount,
    ) -> Result<Quote> {
        if input.is_zero() {
            return Ok(Quote::empty(direction));
        }
        let result = client.quote(direction, input).await?;
        let meets_minimum = result.output.raw() >= self.min_output.raw();
        debug!(
            %input,
            output = %result.output,
            fee = %result.fee,
            meets_minimum,
            "[QUOTE] quote received"
        );
        Ok(Quote {
            input,
            output: result.output,
            fee: result.fee,
            meets_minimum,
        })
    }

    /// Swap button state for a quote of `input_text`.
    pub fn swap_button(&self, quote: &Quote, direction: Direction, input_text: &str) -> SwapButton {
        if quote.is_empty() {
            return SwapButton::enter_amount();
        }
        if quote.meets_minimum {
            SwapButton::swap(input_text.trim(), direction.input_token())
        } else {
            SwapButton {
                enabled: false,
                label: format!("Amount too small (min {} tokens)", self.min_label()),
            }
        }
    }

    /// `2` rather than `2.0` in the too-small label.
    fn min_label(&self) -> String {
        let shown = self.min_output.to_string();
        shown.strip_suffix(".0").map(str::to_string).unwrap_or(shown)
    }
}
