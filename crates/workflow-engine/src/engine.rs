//! The five-step record-update state machine.
//!
//! Steps run strictly in order and each marks the ledger only after its UI
//! effect is confirmed. A run that stops early still reports the partial
//! ledger. A run counts as a success only when every step ran to the end
//! and the completed-step count reaches the configured threshold: by then
//! the operator only has to review and save in the browser window we leave
//! open.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use browser_adapter::{DriverError, PageDriver};
use invoicerelay_core_types::{
    AutomationTask, EngineConfig, Step, StepLedger, SubAction, SubActionLedger,
};
use invoicerelay_event_log::SessionLog;
use record_locator::{
    apply_mapping, count_visible, find_unique, suffix_variants, variants, LocatorError,
    MatchCandidate, MatchMode,
};

use crate::auth;
use crate::errors::WorkflowError;
use crate::selectors;
use crate::waits::{checkpoint, poll_find, POLL_INTERVAL};

/// Outcome of one workflow run. The ledger is always populated, success or
/// not, so callers can see exactly how far the run got.
#[derive(Debug)]
pub struct AutomationReport {
    pub success: bool,
    pub ledger: StepLedger,
    pub error: Option<WorkflowError>,
}

pub struct WorkflowEngine {
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drive one task through the workflow on an already-launched session.
    /// Never closes the browser.
    pub async fn run(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
        log: &SessionLog,
        cancel: &CancellationToken,
    ) -> AutomationReport {
        let mut ledger = StepLedger::default();
        let outcome = self
            .run_steps(driver, task, log, cancel, &mut ledger)
            .await;

        // A hard step failure ends the run failed no matter how far it got;
        // the threshold only tolerates a clean run whose final update step
        // could not mark itself.
        let completed = ledger.completed_steps();
        let required = self.config.success_threshold;
        let success = outcome.is_ok() && completed >= required;

        let error = match outcome {
            Ok(()) if success => None,
            Ok(()) => Some(WorkflowError::InsufficientStepsCompleted {
                completed,
                required,
                ledger: ledger.clone(),
            }),
            Err(err) => {
                log.error(format!("workflow stopped: {err}"));
                Some(err)
            }
        };
        if success {
            log.success(format!("run finished with {completed}/5 steps complete"));
        }

        AutomationReport {
            success,
            ledger,
            error,
        }
    }

    async fn run_steps(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
        log: &SessionLog,
        cancel: &CancellationToken,
        ledger: &mut StepLedger,
    ) -> Result<(), WorkflowError> {
        auth::authenticate(driver, &self.config, log, cancel).await?;
        ledger.mark(Step::Authenticate);
        log.success("authenticated");

        checkpoint(cancel)?;
        self.select_record(driver, task, log, cancel).await?;
        ledger.mark(Step::SelectRecord);
        log.success("record selected");

        checkpoint(cancel)?;
        self.navigate_section(driver, cancel).await?;
        ledger.mark(Step::NavigateSection);
        log.success(format!("opened {}", self.config.section_link));

        checkpoint(cancel)?;
        self.locate_item(driver, task, log, cancel).await?;
        ledger.mark(Step::LocateItem);
        log.success("item located");

        checkpoint(cancel)?;
        self.apply_updates(driver, task, log, cancel, &mut ledger.sub_actions)
            .await?;
        if ledger.sub_actions.succeeded() > 0 {
            ledger.mark(Step::ApplyUpdates);
            log.success(format!(
                "updates applied ({} of {} sub-actions)",
                ledger.sub_actions.succeeded(),
                ledger.sub_actions.attempted()
            ));
        } else {
            log.warning("no field update could be applied");
        }
        Ok(())
    }

    async fn select_record(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
        log: &SessionLog,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let timing = &self.config.timing;
        let short = Duration::from_millis(timing.short_wait_ms);

        let trigger = poll_find(
            driver,
            &selectors::picker_triggers(),
            "",
            MatchMode::Contains,
            short,
            cancel,
        )
        .await?
        .ok_or(WorkflowError::PickerNotFound)?;
        driver.click(trigger.node).await?;
        self.pause().await;

        let input = poll_find(
            driver,
            &selectors::picker_inputs(),
            "",
            MatchMode::Contains,
            short,
            cancel,
        )
        .await?
        .ok_or(WorkflowError::PickerNotFound)?;
        driver.focus(input.node).await?;

        let term = apply_mapping(&self.config.mapping_rules, &task.reference_code)
            .unwrap_or_else(|| task.reference_code.clone());
        log.info(format!("searching for record with '{term}'"));

        let options = selectors::record_options();

        // Type like a human: one character at a time, stopping as soon as
        // the live search narrows to a single result.
        let mut narrowed = false;
        for (i, ch) in term.chars().enumerate() {
            checkpoint(cancel)?;
            driver.type_text(&ch.to_string()).await?;
            sleep(Duration::from_millis(timing.typing_delay_ms)).await;
            if (i + 1) % 3 == 0 {
                match count_visible(driver, &options).await {
                    Ok(1) => {
                        debug!(typed = i + 1, "search narrowed to a single result");
                        narrowed = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(LocatorError::Driver(err)) => return Err(err.into()),
                    Err(_) => {}
                }
            }
        }
        if !narrowed {
            self.pause().await;
        }

        let mut terms = vec![term.clone()];
        for variant in variants(&task.reference_code, &self.config.mapping_rules) {
            if !terms.contains(&variant) {
                terms.push(variant);
            }
        }

        let mut chosen = None;
        for candidate_term in &terms {
            checkpoint(cancel)?;
            match find_unique(driver, &options, candidate_term, MatchMode::Contains).await {
                Ok(found) => {
                    chosen = Some(found);
                    break;
                }
                Err(LocatorError::Driver(err)) => return Err(err.into()),
                Err(_) => {}
            }
        }
        let chosen = chosen.ok_or(WorkflowError::RecordNotFound { variants: terms })?;
        log.info(format!("selecting record '{}'", chosen.text.trim()));

        let before = driver.current_url().await?;
        driver.click(chosen.node).await?;
        self.wait_for_navigation(driver, &before, log, cancel).await
    }

    /// Wait for the location to change after a selection click. Some views
    /// swap content in place, so a missing change is a warning, not an
    /// error.
    async fn wait_for_navigation(
        &self,
        driver: &dyn PageDriver,
        before: &str,
        log: &SessionLog,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let deadline = Duration::from_millis(self.config.timing.medium_wait_ms);
        let start = Instant::now();
        loop {
            checkpoint(cancel)?;
            if driver.current_url().await? != before {
                break;
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                log.warning("no navigation detected after selection; continuing");
                break;
            }
            sleep(POLL_INTERVAL.min(deadline - elapsed)).await;
        }
        self.pause().await;
        Ok(())
    }

    async fn navigate_section(
        &self,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let medium = Duration::from_millis(self.config.timing.medium_wait_ms);
        let link = poll_find(
            driver,
            &selectors::section_links(),
            &self.config.section_link,
            MatchMode::Contains,
            medium,
            cancel,
        )
        .await?
        .ok_or(WorkflowError::SectionLinkNotFound)?;
        driver.click(link.node).await?;
        self.pause().await;
        Ok(())
    }

    async fn locate_item(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
        log: &SessionLog,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let item_variants = suffix_variants(&task.reference_code);
        log.info(format!("locating item; variants {item_variants:?}"));

        let mut found = self.scan_for_item(driver, &item_variants, cancel).await?;
        if found.is_none() {
            found = self
                .search_for_item(driver, task, &item_variants, log, cancel)
                .await?;
        }
        if found.is_none() {
            found = self.scroll_for_item(driver, &item_variants, cancel).await?;
        }

        let hit = found.ok_or(WorkflowError::ItemNotFound {
            variants: item_variants,
        })?;
        log.info(format!("opening item '{}'", hit.text.trim()));
        driver.click(hit.node).await?;
        self.pause().await;
        Ok(())
    }

    async fn scan_for_item(
        &self,
        driver: &dyn PageDriver,
        item_variants: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<MatchCandidate>, WorkflowError> {
        let strategies = selectors::item_entries();
        for variant in item_variants {
            checkpoint(cancel)?;
            match find_unique(driver, &strategies, variant, MatchMode::Contains).await {
                Ok(hit) => return Ok(Some(hit)),
                Err(LocatorError::Driver(err)) => return Err(err.into()),
                Err(_) => {}
            }
        }
        Ok(None)
    }

    /// Fallback (a): drive the listing's own search box, zero-stripped
    /// variant first, then the raw code.
    async fn search_for_item(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
        item_variants: &[String],
        log: &SessionLog,
        cancel: &CancellationToken,
    ) -> Result<Option<MatchCandidate>, WorkflowError> {
        let input = match find_unique(
            driver,
            &selectors::item_search_inputs(),
            "",
            MatchMode::Contains,
        )
        .await
        {
            Ok(input) => input,
            Err(LocatorError::Driver(err)) => return Err(err.into()),
            Err(_) => {
                debug!("listing has no search box");
                return Ok(None);
            }
        };

        let mut terms: Vec<&str> = Vec::new();
        if let Some(stripped) = item_variants.get(1) {
            terms.push(stripped);
        }
        terms.push(&task.reference_code);

        for term in terms {
            checkpoint(cancel)?;
            log.info(format!("filtering listing with '{term}'"));
            driver.fill(input.node, term).await?;
            self.pause().await;
            if let Some(hit) = self.scan_for_item(driver, item_variants, cancel).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Fallback (b): bounded incremental scrolling, re-scanning after each
    /// step.
    async fn scroll_for_item(
        &self,
        driver: &dyn PageDriver,
        item_variants: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<MatchCandidate>, WorkflowError> {
        for attempt in 1..=self.config.scroll_attempts {
            checkpoint(cancel)?;
            driver
                .scroll_by(selectors::ITEM_SCROLL_CONTAINER, 600.0)
                .await?;
            self.pause().await;
            if let Some(hit) = self.scan_for_item(driver, item_variants, cancel).await? {
                debug!(attempt, "item appeared after scrolling");
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    async fn apply_updates(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
        log: &SessionLog,
        cancel: &CancellationToken,
        subs: &mut SubActionLedger,
    ) -> Result<(), WorkflowError> {
        self.enter_edit_mode(driver, cancel).await?;

        checkpoint(cancel)?;
        let ok = note_sub(log, "title", self.update_title(driver, task).await)?;
        subs.record(SubAction::Title, ok);

        checkpoint(cancel)?;
        let ok = note_sub(log, "status", self.update_status(driver).await)?;
        subs.record(SubAction::Status, ok);

        if !task.attachment_paths.is_empty() {
            checkpoint(cancel)?;
            let ok = note_sub(log, "attachment", self.attach_files(driver, task).await)?;
            subs.record(SubAction::Attachment, ok);
        }

        checkpoint(cancel)?;
        let ok = note_sub(log, "line item", self.add_line_item(driver, task).await)?;
        subs.record(SubAction::LineItem, ok);

        Ok(())
    }

    async fn enter_edit_mode(
        &self,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        checkpoint(cancel)?;
        match find_unique(driver, &selectors::edit_controls(), "Edit", MatchMode::Contains).await {
            Ok(ctrl) => {
                driver.click(ctrl.node).await?;
                self.pause().await;
            }
            Err(LocatorError::Driver(err)) => return Err(err.into()),
            Err(_) => debug!("no edit control; assuming fields are editable"),
        }
        Ok(())
    }

    async fn update_title(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
    ) -> Result<(), WorkflowError> {
        let field =
            find_unique(driver, &selectors::title_inputs(), "", MatchMode::Contains).await?;
        let current = driver.read_value(field.node).await?;
        if current.contains(&task.invoice_id) {
            // Already appended by an earlier run against the same record.
            return Ok(());
        }
        let title = if current.trim().is_empty() {
            format!("Invoice {}", task.invoice_id)
        } else {
            format!("{} - Invoice {}", current.trim(), task.invoice_id)
        };
        driver.fill(field.node, &title).await?;
        Ok(())
    }

    async fn update_status(&self, driver: &dyn PageDriver) -> Result<(), WorkflowError> {
        let trigger =
            find_unique(driver, &selectors::status_triggers(), "", MatchMode::Contains).await?;
        driver.click(trigger.node).await?;
        self.pause().await;

        let option = find_unique(
            driver,
            &selectors::status_options(),
            &self.config.target_status,
            MatchMode::Exact,
        )
        .await?;
        driver.click(option.node).await?;
        Ok(())
    }

    async fn attach_files(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
    ) -> Result<(), WorkflowError> {
        // File inputs are styled away behind upload buttons; query them
        // directly instead of going through the visibility filter.
        let hits = driver.query(selectors::FILE_INPUTS).await?;
        let input = hits.first().ok_or_else(|| {
            WorkflowError::Environment(DriverError::Protocol("no file input on page".into()))
        })?;
        driver.set_files(input.node, &task.attachment_paths).await?;
        Ok(())
    }

    async fn add_line_item(
        &self,
        driver: &dyn PageDriver,
        task: &AutomationTask,
    ) -> Result<(), WorkflowError> {
        let add = find_unique(
            driver,
            &selectors::add_line_controls(),
            "Add",
            MatchMode::Contains,
        )
        .await?;
        driver.click(add.node).await?;
        self.pause().await;

        let headers = driver.query(selectors::LINE_TABLE_HEADERS).await?;
        let names: Vec<String> = headers.iter().map(|h| h.text.trim().to_lowercase()).collect();
        // A leading "#" column carries the row number and has no input.
        let skip = usize::from(names.first().map(|n| n.as_str() == "#").unwrap_or(false));
        let desc_col = names
            .iter()
            .position(|n| n.contains("description"))
            .unwrap_or(skip);
        let amount_col = names
            .iter()
            .position(|n| n.contains("amount"))
            .unwrap_or(desc_col + 1);

        let inputs = driver.query(selectors::LINE_LAST_ROW_INPUTS).await?;
        if inputs.is_empty() {
            return Err(WorkflowError::Environment(DriverError::Protocol(
                "line item row has no editable cells".into(),
            )));
        }
        let offset = if inputs.len() + skip == names.len() {
            skip
        } else {
            0
        };

        if let Some(cell) = inputs.get(desc_col.saturating_sub(offset)) {
            driver
                .fill(cell.node, &format!("Invoice {}", task.invoice_id))
                .await?;
        }
        if let Some(amount) = &task.amount {
            if let Some(cell) = inputs.get(amount_col.saturating_sub(offset)) {
                driver.fill(cell.node, amount).await?;
            }
        }
        Ok(())
    }

    async fn pause(&self) {
        sleep(Duration::from_millis(self.config.timing.action_pause_ms)).await;
    }
}

/// Fold a sub-action outcome into the ledger: failures are logged and
/// flagged, but only cancellation and a dead browser abort the siblings.
fn note_sub(
    log: &SessionLog,
    name: &str,
    result: Result<(), WorkflowError>,
) -> Result<bool, WorkflowError> {
    match result {
        Ok(()) => {
            log.success(format!("{name} updated"));
            Ok(true)
        }
        Err(WorkflowError::Cancelled) => Err(WorkflowError::Cancelled),
        Err(WorkflowError::Environment(DriverError::Closed)) => {
            Err(WorkflowError::Environment(DriverError::Closed))
        }
        Err(err) => {
            log.warning(format!("{name} update failed: {err}"));
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browser_adapter::testing::FakeDriver;
    use invoicerelay_core_types::{SessionId, TimingConfig};
    use invoicerelay_event_log::SessionBroadcaster;

    fn fast_engine() -> WorkflowEngine {
        WorkflowEngine::new(EngineConfig {
            target_url: "https://app.example/home".into(),
            timing: TimingConfig {
                short_wait_ms: 50,
                medium_wait_ms: 50,
                auth_primary_ms: 50,
                auth_manual_ms: 50,
                typing_delay_ms: 1,
                action_pause_ms: 1,
            },
            ..EngineConfig::default()
        })
    }

    fn log() -> SessionLog {
        SessionLog::new(SessionBroadcaster::new(), SessionId::new())
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancelled_with_empty_ledger() {
        let driver = FakeDriver::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let task = AutomationTask::new("ACME-012", "INV-77");
        let report = fast_engine()
            .run(driver.as_ref(), &task, &log(), &cancel)
            .await;

        assert!(!report.success);
        assert!(matches!(report.error, Some(WorkflowError::Cancelled)));
        assert_eq!(report.ledger.completed_steps(), 0);
    }

    #[tokio::test]
    async fn missing_picker_fails_below_threshold() {
        // Authenticated landing page, but no picker control ever appears.
        let driver = FakeDriver::new();
        let task = AutomationTask::new("ACME-012", "INV-77");

        let report = fast_engine()
            .run(driver.as_ref(), &task, &log(), &CancellationToken::new())
            .await;

        assert!(!report.success);
        assert!(matches!(report.error, Some(WorkflowError::PickerNotFound)));
        assert!(report.ledger.authenticate);
        assert!(!report.ledger.select_record);
        assert_eq!(report.ledger.completed_steps(), 1);
    }
}
