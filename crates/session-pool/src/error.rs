use browser_adapter::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to launch browser session: {0}")]
    Launch(#[from] DriverError),

    /// The pool was shut down while the request was queued or launching.
    #[error("session pool closed")]
    Closed,
}
