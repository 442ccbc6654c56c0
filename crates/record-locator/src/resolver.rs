//! Fuzzy element resolution over ordered candidate strategies.
//!
//! A strategy producing elements is not enough to stop the search: only a
//! visible element that satisfies the match mode, or the single visible
//! candidate rule, ends it. The single-candidate rule covers live-search
//! widgets that narrow to one row before the full target text is typed.

use browser_adapter::PageDriver;
use tracing::debug;

use crate::errors::LocatorError;
use crate::types::{CandidateQuery, MatchCandidate, MatchMode};

fn satisfies(text: &str, target: &str, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Exact => text.trim() == target,
        MatchMode::Contains => text.contains(target),
    }
}

/// Find the one visible element for `target`, trying strategies in order.
///
/// Within each strategy: a visible candidate satisfying `mode` wins; failing
/// that, exactly one visible candidate wins regardless of its text.
/// Invisible elements are never returned, even when they match textually.
pub async fn find_unique(
    driver: &dyn PageDriver,
    strategies: &[CandidateQuery],
    target: &str,
    mode: MatchMode,
) -> Result<MatchCandidate, LocatorError> {
    // Smallest unresolved visible set seen, for the ambiguity report.
    let mut narrowest: Option<usize> = None;

    for strategy in strategies {
        let hits = driver.query(strategy.selector()).await?;
        let mut visible: Vec<&browser_adapter::ElementHit> =
            hits.iter().filter(|h| h.visible).collect();

        if strategy.filters_by_target() {
            visible.retain(|h| h.text.contains(target));
        }

        if visible.is_empty() {
            debug!(target: "record-locator", selector = strategy.selector(), "strategy returned no visible candidates");
            continue;
        }

        if let Some(hit) = visible
            .iter()
            .copied()
            .find(|h| satisfies(&h.text, target, mode))
        {
            debug!(target: "record-locator", selector = strategy.selector(), text = %hit.text, "matched by text");
            return Ok(MatchCandidate::from_hit(hit));
        }

        if visible.len() == 1 {
            debug!(target: "record-locator", selector = strategy.selector(), text = %visible[0].text, "single visible candidate accepted");
            return Ok(MatchCandidate::from_hit(visible[0]));
        }

        narrowest = Some(narrowest.map_or(visible.len(), |n| n.min(visible.len())));
    }

    match narrowest {
        None => Err(LocatorError::NotFound {
            target: target.to_string(),
        }),
        Some(count) => Err(LocatorError::Ambiguous {
            target: target.to_string(),
            count,
        }),
    }
}

/// Count visible candidates of the first strategy that yields any.
///
/// Used as the incremental early-exit probe during character-by-character
/// typing; when this reaches exactly one, the caller stops typing and lets
/// [`find_unique`] accept the remaining candidate.
pub async fn count_visible(
    driver: &dyn PageDriver,
    strategies: &[CandidateQuery],
) -> Result<usize, LocatorError> {
    for strategy in strategies {
        let hits = driver.query(strategy.selector()).await?;
        let count = hits.iter().filter(|h| h.visible).count();
        if count > 0 {
            return Ok(count);
        }
    }
    Ok(0)
}
