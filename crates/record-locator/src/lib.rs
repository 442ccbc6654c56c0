//! Record locating for uncontrolled third-party markup.
//!
//! Two leaf components live here: the identifier variant generator, which
//! derives alternate textual forms of a reference code, and the fuzzy
//! element resolver, which turns an ordered list of candidate queries plus a
//! target text into a single visible element or a failure.

pub mod errors;
pub mod resolver;
pub mod types;
pub mod variants;

pub use errors::LocatorError;
pub use resolver::{count_visible, find_unique};
pub use types::{CandidateQuery, MatchCandidate, MatchMode};
pub use variants::{apply_mapping, suffix_variants, variants};
