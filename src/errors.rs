use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No wallet available: set PRIVATE_KEY to connect")]
    NoWallet,

    #[error("Wallet access request was declined")]
    UserRejected,

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("Contract reverted: {0}")]
    Revert(String),

    #[error("Malformed contract response: {0}")]
    Decode(String),

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Swap failed: {0}")]
    SwapFailed(String),

    #[error("A swap is already in progress")]
    SwapInProgress,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount too small: output {output} is below the minimum of {minimum}")]
    BelowMinimum { output: String, minimum: String },

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AppError {
    /// Network and timeout failures may succeed when the user re-triggers
    /// the action. Nothing in the crate retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RemoteCall(_))
    }

    /// Text shown to the user when a swap step fails: the revert reason when
    /// the contract gave one, otherwise the error itself.
    pub fn reason(&self) -> String {
        match self {
            AppError::Revert(reason)
            | AppError::ApprovalFailed(reason)
            | AppError::SwapFailed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ethers::providers::ProviderError> for AppError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        AppError::RemoteCall(e.to_string())
    }
}
