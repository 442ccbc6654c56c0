//! Ordered candidate strategies for the target application's controls.
//!
//! The markup is not ours and drifts between releases, so every control is
//! described as a priority list: specific hooks first, structural fallbacks
//! last. Changing how a control is found means editing a list here, not the
//! workflow.

use record_locator::CandidateQuery;

/// Controls that open the record picker.
pub fn picker_triggers() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("[data-qa*=\"picker\"] button"),
        CandidateQuery::css("button[aria-haspopup=\"listbox\"]"),
        CandidateQuery::css("header button[aria-label*=\"roject\"]"),
        CandidateQuery::css("header button"),
    ]
}

/// Login form fields.
pub fn email_inputs() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("input[type=\"email\"]"),
        CandidateQuery::css("input[name*=\"email\"]"),
        CandidateQuery::css("input[autocomplete=\"username\"]"),
    ]
}

pub fn password_inputs() -> Vec<CandidateQuery> {
    vec![CandidateQuery::css("input[type=\"password\"]")]
}

/// The picker's live-search input.
pub fn picker_inputs() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("[data-qa*=\"picker\"] input"),
        CandidateQuery::css("input[placeholder*=\"earch\"]"),
        CandidateQuery::css("[role=\"combobox\"] input"),
        CandidateQuery::css("[role=\"dialog\"] input[type=\"text\"]"),
    ]
}

/// Result entries offered while searching for a record.
pub fn record_options() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("[role=\"option\"]"),
        CandidateQuery::css("[role=\"menuitem\"]"),
        CandidateQuery::css("[role=\"listbox\"] li"),
        CandidateQuery::css_with_target("li a"),
    ]
}

/// Navigation links within a record's page; matched against the configured
/// section text.
pub fn section_links() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css_with_target("nav a"),
        CandidateQuery::css_with_target("a"),
        CandidateQuery::css_with_target("[role=\"link\"], button"),
    ]
}

/// Item rows and links inside the section listing; matched against
/// identifier suffix variants.
pub fn item_entries() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css_with_target("td a"),
        CandidateQuery::css_with_target("tbody tr td"),
        CandidateQuery::css_with_target("a"),
    ]
}

/// In-page filter/search boxes inside the section listing.
pub fn item_search_inputs() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("input[type=\"search\"]"),
        CandidateQuery::css("input[placeholder*=\"earch\"]"),
        CandidateQuery::css("input[placeholder*=\"ilter\"]"),
    ]
}

/// Scrollable containers holding the item listing, tried before falling
/// back to the document itself.
pub const ITEM_SCROLL_CONTAINER: &str = "[class*=\"scroll\"], .table-container, main";

/// Optional control switching the item view into edit mode.
pub fn edit_controls() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("button[aria-label*=\"Edit\"]"),
        CandidateQuery::css("[data-qa*=\"edit\"] button"),
        CandidateQuery::css_with_target("button"),
    ]
}

/// The record/item title field.
pub fn title_inputs() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("input[name*=\"title\"]"),
        CandidateQuery::css("input[aria-label*=\"itle\"]"),
        CandidateQuery::css("input[id*=\"title\"]"),
    ]
}

/// Controls opening the status dropdown.
pub fn status_triggers() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("[data-qa*=\"status\"] button"),
        CandidateQuery::css("button[aria-label*=\"tatus\"]"),
        CandidateQuery::css("[name*=\"status\"]"),
    ]
}

/// Options inside the opened status dropdown. Matched exactly: the list
/// contains near-misses like "Partially Received" next to "Received".
pub fn status_options() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("[role=\"option\"]"),
        CandidateQuery::css("[role=\"listbox\"] li"),
        CandidateQuery::css("option"),
    ]
}

/// Hidden file inputs backing the attachment chooser. Queried without the
/// visibility filter; file inputs are hidden behind styled buttons.
pub const FILE_INPUTS: &str = "input[type=\"file\"]";

/// Controls that append a line-item row.
pub fn add_line_controls() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("[data-qa*=\"add-line\"] button"),
        CandidateQuery::css_with_target("button"),
        CandidateQuery::css_with_target("a"),
    ]
}

/// Header cells of the line-item table, used to map columns by name.
pub const LINE_TABLE_HEADERS: &str = "table thead th";

/// Editable cells of the newest line-item row.
pub const LINE_LAST_ROW_INPUTS: &str = "table tbody tr:last-child input, table tbody tr:last-child textarea";
