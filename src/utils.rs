//! Miscellaneous helper utilities.

use ethers::types::Address;
use std::fmt as stdfmt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// `0x1234...abcd` form of an address.
pub fn shorten_address(address: &Address) -> String {
    let full = format!("{address:?}");
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

type BoxedLines = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

/// One line reader over an input stream, shared by everyone who reads from
/// the terminal. Lines buffered for one reader stay available to the next.
#[derive(Clone)]
pub struct SharedLines {
    inner: Arc<Mutex<BoxedLines>>,
}

impl SharedLines {
    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let buffered: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(BufReader::new(reader));
        Self {
            inner: Arc::new(Mutex::new(buffered.lines())),
        }
    }

    /// Next line without its terminator, `None` at end of input. Cancel
    /// safe.
    pub async fn next_line(&self) -> std::io::Result<Option<String>> {
        self.inner.lock().await.next_line().await
    }
}

impl stdfmt::Debug for SharedLines {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        f.debug_struct("SharedLines").finish_non_exhaustive()
    }
}
