//! Driver error types.

use thiserror::Error;

/// Errors surfaced while launching or driving a browser.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Browser process could not be launched or configured.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Protocol-level I/O failure (websocket, command submission).
    #[error("cdp i/o failure: {0}")]
    Io(String),

    /// A command exceeded its deadline.
    #[error("cdp command timed out: {0}")]
    Timeout(String),

    /// The page returned an unexpected or malformed payload.
    #[error("unexpected cdp payload: {0}")]
    Protocol(String),

    /// An injected script raised an exception.
    #[error("page script failed: {0}")]
    Script(String),

    /// The browser is gone (crashed or closed by the operator).
    #[error("browser connection closed")]
    Closed,
}

impl DriverError {
    /// Transient failures that a retry loop may reasonably re-attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DriverError::Io(_) | DriverError::Timeout(_))
    }
}
