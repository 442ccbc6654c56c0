//! Resolution error types.

use browser_adapter::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    /// Every strategy was exhausted without a visible match.
    #[error("no visible element matched '{target}'")]
    NotFound { target: String },

    /// Multiple visible candidates survived and none satisfied the match
    /// mode, so no single answer can be chosen.
    #[error("ambiguous match for '{target}': {count} visible candidates")]
    Ambiguous { target: String, count: usize },

    #[error(transparent)]
    Driver(#[from] DriverError),
}
