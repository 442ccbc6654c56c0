//! Shared primitives for the invoicerelay automation kernel.
//!
//! Everything here is plain data: identifiers, the task submitted by the
//! caller, the per-task step ledger, structured log events and the
//! configuration surface consumed by the engine. No I/O lives in this crate.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied correlation id for one automation request.
///
/// The caller picks the value (typically per upload), and every log event
/// emitted while working on that request carries it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one pool slot occupancy; minted when a task
/// acquires a browser session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub Uuid);

impl TaskHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One record-update request. Immutable once submitted; consumed by exactly
/// one workflow run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutomationTask {
    /// External order/PO-style identifier used to locate the record.
    pub reference_code: String,
    /// Invoice identifier appended to the record title.
    pub invoice_id: String,
    /// Optional amount (kept as the caller's string to avoid rounding).
    pub amount: Option<String>,
    /// Files to attach; each path is verified to exist before submission.
    pub attachment_paths: Vec<PathBuf>,
    /// Correlation id for log events.
    pub session_id: SessionId,
}

impl AutomationTask {
    pub fn new(reference_code: impl Into<String>, invoice_id: impl Into<String>) -> Self {
        Self {
            reference_code: reference_code.into(),
            invoice_id: invoice_id.into(),
            amount: None,
            attachment_paths: Vec::new(),
            session_id: SessionId::new(),
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_attachments(mut self, paths: Vec<PathBuf>) -> Self {
        self.attachment_paths = paths;
        self
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }
}

/// The five workflow steps, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Authenticate,
    SelectRecord,
    NavigateSection,
    LocateItem,
    ApplyUpdates,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Authenticate,
        Step::SelectRecord,
        Step::NavigateSection,
        Step::LocateItem,
        Step::ApplyUpdates,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Authenticate => "authenticate",
            Step::SelectRecord => "select_record",
            Step::NavigateSection => "navigate_section",
            Step::LocateItem => "locate_item",
            Step::ApplyUpdates => "apply_updates",
        }
    }
}

/// Sub-actions of the final update step, flagged independently.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAction {
    Title,
    Status,
    Attachment,
    LineItem,
}

impl SubAction {
    pub fn name(&self) -> &'static str {
        match self {
            SubAction::Title => "title",
            SubAction::Status => "status",
            SubAction::Attachment => "attachment",
            SubAction::LineItem => "line_item",
        }
    }
}

/// Per-update-step sub-action flags. `None` means the sub-action never ran
/// (e.g. no attachments were supplied).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubActionLedger {
    pub title: Option<bool>,
    pub status: Option<bool>,
    pub attachment: Option<bool>,
    pub line_item: Option<bool>,
}

impl SubActionLedger {
    pub fn record(&mut self, action: SubAction, ok: bool) {
        let slot = match action {
            SubAction::Title => &mut self.title,
            SubAction::Status => &mut self.status,
            SubAction::Attachment => &mut self.attachment,
            SubAction::LineItem => &mut self.line_item,
        };
        *slot = Some(ok);
    }

    /// Number of sub-actions that ran and were confirmed.
    pub fn succeeded(&self) -> usize {
        [self.title, self.status, self.attachment, self.line_item]
            .iter()
            .filter(|s| **s == Some(true))
            .count()
    }

    /// Number of sub-actions that ran at all.
    pub fn attempted(&self) -> usize {
        [self.title, self.status, self.attachment, self.line_item]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}

/// Per-task record of which workflow steps were confirmed complete.
///
/// A step is marked only after its UI action is confirmed, never merely
/// attempted. Returned to the caller on both success and failure paths so
/// the remaining manual work is always visible.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepLedger {
    pub authenticate: bool,
    pub select_record: bool,
    pub navigate_section: bool,
    pub locate_item: bool,
    pub apply_updates: bool,
    #[serde(default)]
    pub sub_actions: SubActionLedger,
}

impl StepLedger {
    pub fn mark(&mut self, step: Step) {
        match step {
            Step::Authenticate => self.authenticate = true,
            Step::SelectRecord => self.select_record = true,
            Step::NavigateSection => self.navigate_section = true,
            Step::LocateItem => self.locate_item = true,
            Step::ApplyUpdates => self.apply_updates = true,
        }
    }

    pub fn is_complete(&self, step: Step) -> bool {
        match step {
            Step::Authenticate => self.authenticate,
            Step::SelectRecord => self.select_record,
            Step::NavigateSection => self.navigate_section,
            Step::LocateItem => self.locate_item,
            Step::ApplyUpdates => self.apply_updates,
        }
    }

    /// Completed top-level steps, in execution order.
    pub fn completed_steps(&self) -> usize {
        Step::ALL.iter().filter(|s| self.is_complete(**s)).count()
    }

    pub fn entries(&self) -> Vec<(Step, bool)> {
        Step::ALL
            .iter()
            .map(|s| (*s, self.is_complete(*s)))
            .collect()
    }
}

/// Severity of a structured progress event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// Structured, session-scoped progress event. Never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub session_id: SessionId,
    pub task: Option<TaskHandle>,
}

impl LogEvent {
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        session_id: SessionId,
        task: Option<TaskHandle>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            session_id,
            task,
        }
    }
}

/// Operator-supplied hard mapping from a reference-code fragment to the
/// record's canonical in-system name. Matched case-insensitively as a
/// substring; the first matching rule wins and bypasses variant expansion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingRule {
    pub pattern: String,
    pub replacement: String,
}

/// Optional stored credentials for the login auto-fill path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none()
    }
}

/// Waits and pacing delays, all in milliseconds. Fixed delays, not backoff:
/// the target application renders asynchronously at a fairly constant rate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Short polling wait for element appearance.
    pub short_wait_ms: u64,
    /// Medium polling wait for element appearance / navigation settle.
    pub medium_wait_ms: u64,
    /// Primary wait for the authenticated view after auto-fill.
    pub auth_primary_ms: u64,
    /// Fallback wait covering manual two-factor completion.
    pub auth_manual_ms: u64,
    /// Delay between simulated keystrokes.
    pub typing_delay_ms: u64,
    /// Pause between macro UI actions.
    pub action_pause_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            short_wait_ms: 5_000,
            medium_wait_ms: 10_000,
            auth_primary_ms: 45_000,
            auth_manual_ms: 300_000,
            typing_delay_ms: 150,
            action_pause_ms: 1_000,
        }
    }
}

/// Full configuration surface consumed by the engine. Supplied externally
/// (file, env, CLI); opaque to the workflow beyond these fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Home view of the target application.
    pub target_url: String,
    /// Maximum number of concurrently open browser sessions.
    pub pool_capacity: usize,
    /// Minimum completed ledger steps for a cleanly finished run to count
    /// as success.
    pub success_threshold: usize,
    /// Navigational link activated to reach the commitment records.
    pub section_link: String,
    /// Exact option text selected in the status control.
    pub target_status: String,
    /// Bounded scroll attempts while locating the item row.
    pub scroll_attempts: usize,
    /// Launch browsers without a visible window. Headful by default so an
    /// operator can watch and finish manually.
    pub headless: bool,
    pub credentials: Credentials,
    pub mapping_rules: Vec<MappingRule>,
    pub timing: TimingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            pool_capacity: 5,
            success_threshold: 2,
            section_link: "Commitments".to_string(),
            target_status: "Received".to_string(),
            scroll_attempts: 10,
            headless: false,
            credentials: Credentials::default(),
            mapping_rules: Vec::new(),
            timing: TimingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_marks_and_counts() {
        let mut ledger = StepLedger::default();
        assert_eq!(ledger.completed_steps(), 0);

        ledger.mark(Step::Authenticate);
        ledger.mark(Step::SelectRecord);
        assert!(ledger.is_complete(Step::Authenticate));
        assert!(!ledger.is_complete(Step::LocateItem));
        assert_eq!(ledger.completed_steps(), 2);

        let entries = ledger.entries();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], (Step::Authenticate, true));
        assert_eq!(entries[3], (Step::LocateItem, false));
    }

    #[test]
    fn sub_action_ledger_tracks_outcomes() {
        let mut subs = SubActionLedger::default();
        subs.record(SubAction::Title, true);
        subs.record(SubAction::Status, false);
        assert_eq!(subs.succeeded(), 1);
        assert_eq!(subs.attempted(), 2);
        assert_eq!(subs.attachment, None);
    }

    #[test]
    fn ledger_serializes_by_step_name() {
        let mut ledger = StepLedger::default();
        ledger.mark(Step::NavigateSection);
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["navigate_section"], true);
        assert_eq!(json["locate_item"], false);
    }

    #[test]
    fn log_event_carries_session() {
        let session = SessionId("s1".to_string());
        let event = LogEvent::new(LogLevel::Info, "hello", session.clone(), None);
        assert_eq!(event.session_id, session);
        assert_eq!(event.level.as_str(), "info");
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pool_capacity, 5);
        assert_eq!(cfg.success_threshold, 2);
        assert_eq!(cfg.scroll_attempts, 10);
        assert!(!cfg.headless);
    }
}
