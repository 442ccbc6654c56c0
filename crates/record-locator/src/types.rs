//! Core types for the resolver.

use browser_adapter::{ElementHit, NodeRef};
use serde::{Deserialize, Serialize};

/// How candidate text is compared against the target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MatchMode {
    /// Trimmed text equals the target exactly. Used where near-misses are
    /// dangerous, e.g. a "Partially Received" option next to "Received".
    Exact,
    /// Candidate text contains the target as a substring.
    Contains,
}

/// One ordered selection rule. Strategies are tried in listed order; the
/// list can be extended or reordered without touching the resolution loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CandidateQuery {
    /// All elements matching a CSS selector.
    Css(String),
    /// Elements matching a CSS selector, pre-filtered to those whose text
    /// contains the target before mode matching runs.
    CssWithTarget(String),
}

impl CandidateQuery {
    pub fn css(selector: impl Into<String>) -> Self {
        CandidateQuery::Css(selector.into())
    }

    pub fn css_with_target(selector: impl Into<String>) -> Self {
        CandidateQuery::CssWithTarget(selector.into())
    }

    pub fn selector(&self) -> &str {
        match self {
            CandidateQuery::Css(s) | CandidateQuery::CssWithTarget(s) => s,
        }
    }

    pub fn filters_by_target(&self) -> bool {
        matches!(self, CandidateQuery::CssWithTarget(_))
    }
}

/// A resolved element: its page handle plus the extracted text the decision
/// was made on. Transient; never persisted.
#[derive(Clone, Debug)]
pub struct MatchCandidate {
    pub node: NodeRef,
    pub text: String,
}

impl MatchCandidate {
    pub fn from_hit(hit: &ElementHit) -> Self {
        Self {
            node: hit.node,
            text: hit.text.clone(),
        }
    }
}
