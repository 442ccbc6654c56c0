//! Cooperative waiting primitives shared by the workflow steps.

use std::time::Duration;

use browser_adapter::PageDriver;
use record_locator::{find_unique, CandidateQuery, LocatorError, MatchCandidate, MatchMode};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::WorkflowError;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cancellation is honoured between discrete actions, never inside one.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<(), WorkflowError> {
    if cancel.is_cancelled() {
        Err(WorkflowError::Cancelled)
    } else {
        Ok(())
    }
}

/// Poll the resolver until it produces a candidate or `deadline` passes.
/// `Ok(None)` means the element never appeared; driver failures abort.
pub(crate) async fn poll_find(
    driver: &dyn PageDriver,
    strategies: &[CandidateQuery],
    target: &str,
    mode: MatchMode,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<Option<MatchCandidate>, WorkflowError> {
    let start = Instant::now();
    loop {
        checkpoint(cancel)?;
        match find_unique(driver, strategies, target, mode).await {
            Ok(found) => return Ok(Some(found)),
            Err(LocatorError::Driver(err)) => return Err(err.into()),
            Err(_) => {}
        }
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL.min(deadline - elapsed)).await;
    }
}
