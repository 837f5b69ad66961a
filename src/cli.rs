//! Command-line surface and terminal rendering.

use crate::amount::TokenAmount;
use crate::chain::{ContractInfo, TxReceiptSummary};
use crate::models::{Direction, DisplayState, PoolSnapshot, StatusKind, Token};
use crate::quote::Quote;
use crate::utils::shorten_address;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "stableswap")]
#[command(version)]
#[command(about = "Quote and swap USDC/EURC against the stable swap pool", long_about = None)]
pub struct Cli {
    /// Grant wallet access without asking
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Print state as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Quote an input amount without swapping
    Quote {
        amount: String,
        #[arg(short, long, value_enum, default_value_t = DirectionArg::UsdcToEurc)]
        direction: DirectionArg,
    },
    /// Approve if needed, then swap
    Swap {
        amount: String,
        #[arg(short, long, value_enum, default_value_t = DirectionArg::UsdcToEurc)]
        direction: DirectionArg,
    },
    /// Show wallet balances
    Balances {
        #[arg(short, long, value_enum, default_value_t = DirectionArg::UsdcToEurc)]
        direction: DirectionArg,
    },
    /// Show pool liquidity
    Pool,
    /// Show pool parameters
    Info,
    /// Interactive session with periodic refresh
    Watch {
        #[arg(short, long, value_enum, default_value_t = DirectionArg::UsdcToEurc)]
        direction: DirectionArg,
    },
    /// Owner-only pool management
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Deposit tokens into the pool
    Fund { token: TokenArg, amount: String },
    /// Withdraw tokens from the pool
    Withdraw { token: TokenArg, amount: String },
    /// Pause swaps
    Pause,
    /// Resume swaps
    Unpause,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectionArg {
    UsdcToEurc,
    EurcToUsdc,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::UsdcToEurc => Direction::UsdcToEurc,
            DirectionArg::EurcToUsdc => Direction::EurcToUsdc,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenArg {
    Usdc,
    Eurc,
}

impl From<TokenArg> for Token {
    fn from(arg: TokenArg) -> Self {
        match arg {
            TokenArg::Usdc => Token::Usdc,
            TokenArg::Eurc => Token::Eurc,
        }
    }
}

/// One line typed into `watch` mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Amount(String),
    Toggle,
    Swap,
    Refresh,
    Account(usize),
    Revoke,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let head = parts.next()?;
        let arg = parts.next();
        let cmd = match (head, arg) {
            ("amount" | "a", Some(v)) => ConsoleCommand::Amount(v.to_string()),
            ("toggle" | "t", None) => ConsoleCommand::Toggle,
            ("swap" | "s", None) => ConsoleCommand::Swap,
            ("refresh" | "r", None) => ConsoleCommand::Refresh,
            ("account", Some(v)) => ConsoleCommand::Account(v.parse().ok()?),
            ("revoke", None) => ConsoleCommand::Revoke,
            ("help" | "?", None) => ConsoleCommand::Help,
            ("quit" | "exit" | "q", None) => ConsoleCommand::Quit,
            (v, None) if v.starts_with(|c: char| c.is_ascii_digit() || c == '.') => {
                ConsoleCommand::Amount(v.to_string())
            }
            _ => return None,
        };
        Some(cmd)
    }
}

pub const CONSOLE_HELP: &str = "\
commands:
  <amount> | amount <x>   set the input amount and quote it
  toggle                  flip the swap direction
  swap                    swap the current amount
  refresh                 reload balances and pool
  account <n>             switch to the n-th configured key
  revoke                  withdraw wallet access
  quit";

/// Amount rounded to two places with thousands separators: `18,000` or
/// `1,234.57`.
pub fn format_money(amount: &TokenAmount) -> String {
    let rounded = amount.to_decimal().round(2).to_string();
    let (whole, frac) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let frac = frac.trim_end_matches('0');

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if frac.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac}")
    }
}

pub fn render_pool(pool: &PoolSnapshot) -> String {
    let total = pool
        .total()
        .map(|t| format!("${}", format_money(&t)))
        .unwrap_or_else(|| "overflow".into());
    format!(
        "Pool:    USDC ${} | EURC €{} | Total {}",
        format_money(&pool.usdc),
        format_money(&pool.eurc),
        total
    )
}

pub fn render_quote(quote: &Quote, direction: Direction) -> String {
    format!(
        "{} {} -> {} {} (fee {} {})",
        quote.input,
        direction.input_token(),
        quote.output,
        direction.output_token(),
        quote.fee,
        direction.output_token()
    )
}

pub fn render_info(info: &ContractInfo) -> String {
    format!(
        "Exchange rate: {}\nFee:           {}\nPaused:        {}\nOwner:         {:?}",
        info.exchange_rate, info.fee_percentage, info.paused, info.owner
    )
}

pub fn render_receipt(receipt: &TxReceiptSummary) -> String {
    let mut out = format!("Transaction {:?}", receipt.tx_hash);
    if let Some(block) = receipt.block_number {
        out.push_str(&format!(" in block {block}"));
    }
    if let Some(ev) = &receipt.swap_event {
        out.push_str(&format!(
            "\nSwapped {} {} for {} {} (fee {})",
            ev.amount_in,
            ev.direction.input_token(),
            ev.amount_out,
            ev.direction.output_token(),
            ev.fee
        ));
    }
    out
}

/// Text view of everything the swap panel shows.
pub fn render(state: &DisplayState) -> String {
    let from = state.direction.input_token();
    let to = state.direction.output_token();
    let mut lines = Vec::new();

    lines.push(match &state.connected_address {
        Some(addr) => format!("Wallet:  {}", shorten_address(addr)),
        None => "Wallet:  not connected".to_string(),
    });

    let balance = |pick: fn(&crate::models::WalletBalances) -> TokenAmount| {
        state
            .balances
            .as_ref()
            .map(|b| pick(b).to_string())
            .unwrap_or_else(|| "-".into())
    };
    let input = state.input_text.clone().unwrap_or_default();
    let output = state
        .output_amount
        .map(|a| a.to_string())
        .unwrap_or_default();
    lines.push(format!(
        "From:    {input:<14} {from}  (balance {})",
        balance(|b| b.input)
    ));
    lines.push(format!(
        "To:      {output:<14} {to}  (balance {})",
        balance(|b| b.output)
    ));
    lines.push(format!("Fee:     {} {to}", state.fee));

    if let Some(pool) = &state.pool {
        lines.push(render_pool(pool));
    }

    let button = if state.swap_button.enabled {
        format!("[ {} ]", state.swap_button.label)
    } else {
        format!("( {} )", state.swap_button.label)
    };
    lines.push(button);

    if let Some(status) = &state.status {
        let tag = match status.kind {
            StatusKind::Success => "ok",
            StatusKind::Error => "error",
        };
        lines.push(format!("[{tag}] {}", status.text));
    }
    lines.join("\n")
}
