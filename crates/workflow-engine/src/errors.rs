//! Workflow failure taxonomy.

use browser_adapter::DriverError;
use invoicerelay_core_types::StepLedger;
use record_locator::LocatorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Neither the primary nor the manual-completion wait produced an
    /// authenticated view.
    #[error("authentication did not complete in time")]
    AuthenticationTimeout,

    /// The record picker control never appeared.
    #[error("record picker not found")]
    PickerNotFound,

    /// No identifier variant resolved to a record.
    #[error("record not found; tried variants {variants:?}")]
    RecordNotFound { variants: Vec<String> },

    /// The configured section link could not be activated.
    #[error("section link not found")]
    SectionLinkNotFound,

    /// The item row stayed hidden through search and scrolling.
    #[error("item not found; tried variants {variants:?}")]
    ItemNotFound { variants: Vec<String> },

    /// The run finished below the configured success threshold.
    #[error("only {completed} of {required} required steps completed")]
    InsufficientStepsCompleted {
        completed: usize,
        required: usize,
        ledger: StepLedger,
    },

    /// The caller cancelled between actions.
    #[error("cancelled")]
    Cancelled,

    /// Browser or protocol failure outside the workflow's control.
    #[error("environment failure: {0}")]
    Environment(#[from] DriverError),
}

impl From<LocatorError> for WorkflowError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::Driver(inner) => WorkflowError::Environment(inner),
            other => WorkflowError::Environment(DriverError::Protocol(other.to_string())),
        }
    }
}
