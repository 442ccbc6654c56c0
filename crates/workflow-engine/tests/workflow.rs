//! End-to-end workflow runs against a scripted page.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use browser_adapter::testing::{FakeDriver, FakeEffect};
use browser_adapter::{ElementHit, NodeRef};
use invoicerelay_core_types::{AutomationTask, EngineConfig, SessionId, TimingConfig};
use invoicerelay_event_log::{SessionBroadcaster, SessionLog};
use workflow_engine::{selectors, WorkflowEngine, WorkflowError};

const HOME: &str = "https://app.example/home";
const PROJECT: &str = "https://app.example/projects/9";

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(EngineConfig {
        target_url: HOME.into(),
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

/// Script a page that carries the run through record selection and the
/// section link; item rows and edit fields are optional.
fn script_page(driver: &Arc<FakeDriver>, with_item: bool, with_title: bool) {
    driver.set_hits(
        "[data-qa*=\"picker\"] button",
        vec![ElementHit::new(0, "Select a project", true)],
    );
    driver.set_hits(
        "[data-qa*=\"picker\"] input",
        vec![ElementHit::new(1, "", true)],
    );
    // The live search narrows to one result after three characters.
    driver.after_typed(
        3,
        vec![FakeEffect::SetHits(
            "[role=\"option\"]".into(),
            vec![ElementHit::new(2, "ACME-012 Shopping Centre", true)],
        )],
    );
    driver.on_click(
        NodeRef(2),
        vec![
            FakeEffect::SetUrl(PROJECT.into()),
            FakeEffect::ClearHits("[role=\"option\"]".into()),
            FakeEffect::SetHits(
                "nav a".into(),
                vec![ElementHit::new(3, "Commitments", true)],
            ),
        ],
    );

    let mut section_effects = Vec::new();
    if with_item {
        section_effects.push(FakeEffect::SetHits(
            "td a".into(),
            vec![ElementHit::new(4, "PO 12 concrete supply", true)],
        ));
    }
    driver.on_click(NodeRef(3), section_effects);

    let mut item_effects = vec![FakeEffect::SetHits(
        "[data-qa*=\"status\"] button".into(),
        vec![ElementHit::new(6, "Draft", true)],
    )];
    if with_title {
        item_effects.push(FakeEffect::SetHits(
            "input[name*=\"title\"]".into(),
            vec![ElementHit::new(5, "", true)],
        ));
    }
    item_effects.push(FakeEffect::SetHits(
        "[data-qa*=\"add-line\"] button".into(),
        vec![ElementHit::new(9, "Add line", true)],
    ));
    driver.on_click(NodeRef(4), item_effects);
    driver.set_value(NodeRef(5), "PO 12 concrete supply");

    driver.on_click(
        NodeRef(6),
        vec![FakeEffect::SetHits(
            "[role=\"option\"]".into(),
            vec![
                ElementHit::new(7, "Partially Received", true),
                ElementHit::new(8, "Received", true),
            ],
        )],
    );

    driver.on_click(
        NodeRef(9),
        vec![
            FakeEffect::SetHits(
                selectors::LINE_TABLE_HEADERS.into(),
                vec![
                    ElementHit::new(10, "#", true),
                    ElementHit::new(11, "Description", true),
                    ElementHit::new(12, "Amount", true),
                ],
            ),
            FakeEffect::SetHits(
                selectors::LINE_LAST_ROW_INPUTS.into(),
                vec![ElementHit::new(13, "", true), ElementHit::new(14, "", true)],
            ),
        ],
    );
}

#[tokio::test]
async fn full_run_completes_all_steps_with_early_exit_typing() {
    let driver = FakeDriver::new();
    script_page(&driver, true, true);

    let task = AutomationTask::new("ACME-012", "INV-77").with_amount("1234.50");
    let report = engine()
        .run(driver.as_ref(), &task, &log(), &CancellationToken::new())
        .await;

    assert!(report.success, "error: {:?}", report.error);
    assert!(report.error.is_none());
    assert_eq!(report.ledger.completed_steps(), 5);

    // Typing stopped after the third character narrowed the search.
    assert_eq!(driver.typed(), "ACM");

    let filled = driver.filled();
    assert!(filled
        .iter()
        .any(|(n, v)| *n == NodeRef(5) && v == "PO 12 concrete supply - Invoice INV-77"));
    assert!(filled
        .iter()
        .any(|(n, v)| *n == NodeRef(13) && v == "Invoice INV-77"));
    assert!(filled.iter().any(|(n, v)| *n == NodeRef(14) && v == "1234.50"));

    // Exact status match skipped "Partially Received".
    assert!(driver.clicked().contains(&NodeRef(8)));
    assert!(!driver.clicked().contains(&NodeRef(7)));

    assert_eq!(report.ledger.sub_actions.title, Some(true));
    assert_eq!(report.ledger.sub_actions.status, Some(true));
    assert_eq!(report.ledger.sub_actions.attachment, None);
    assert_eq!(report.ledger.sub_actions.line_item, Some(true));

    // The browser is left open for review.
    assert!(!driver.was_closed());
}

#[tokio::test]
async fn missing_item_exhausts_fallbacks_and_ends_failed() {
    let driver = FakeDriver::new();
    script_page(&driver, false, true);

    let task = AutomationTask::new("ACME-012", "INV-77");
    let report = engine()
        .run(driver.as_ref(), &task, &log(), &CancellationToken::new())
        .await;

    // Three completed steps do not rescue a run that died on a hard step
    // failure.
    assert!(!report.success);
    assert!(matches!(
        report.error,
        Some(WorkflowError::ItemNotFound { .. })
    ));
    assert!(report.ledger.authenticate);
    assert!(report.ledger.select_record);
    assert!(report.ledger.navigate_section);
    assert!(!report.ledger.locate_item);
    assert!(!report.ledger.apply_updates);

    // The scroll fallback ran its bounded attempts.
    assert_eq!(driver.scroll_count(), EngineConfig::default().scroll_attempts);
}

#[tokio::test]
async fn failed_sub_action_does_not_abort_siblings() {
    let driver = FakeDriver::new();
    script_page(&driver, true, false);

    let task = AutomationTask::new("ACME-012", "INV-77");
    let report = engine()
        .run(driver.as_ref(), &task, &log(), &CancellationToken::new())
        .await;

    assert!(report.success);
    assert_eq!(report.ledger.sub_actions.title, Some(false));
    assert_eq!(report.ledger.sub_actions.status, Some(true));
    assert_eq!(report.ledger.sub_actions.line_item, Some(true));
    assert!(report.ledger.apply_updates);
}

#[tokio::test]
async fn attachments_are_dispatched_to_the_file_input() {
    let driver = FakeDriver::new();
    script_page(&driver, true, true);
    // Hidden file input behind the upload button.
    driver.set_hits(
        "input[type=\"file\"]",
        vec![ElementHit::new(20, "", false)],
    );

    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("invoice.pdf");
    std::fs::write(&pdf, b"%PDF-1.4").unwrap();

    let task = AutomationTask::new("ACME-012", "INV-77").with_attachments(vec![pdf.clone()]);
    let report = engine()
        .run(driver.as_ref(), &task, &log(), &CancellationToken::new())
        .await;

    assert!(report.success);
    assert_eq!(report.ledger.sub_actions.attachment, Some(true));
    let files = driver.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, NodeRef(20));
    assert_eq!(files[0].1, vec![pdf]);
}

#[tokio::test]
async fn mapping_rule_replaces_the_search_term() {
    let driver = FakeDriver::new();
    driver.set_hits(
        "[data-qa*=\"picker\"] button",
        vec![ElementHit::new(0, "Select a project", true)],
    );
    driver.set_hits(
        "[data-qa*=\"picker\"] input",
        vec![ElementHit::new(1, "", true)],
    );

    let mut config = EngineConfig {
        target_url: HOME.into(),
        timing: TimingConfig {
            short_wait_ms: 50,
            medium_wait_ms: 50,
            auth_primary_ms: 50,
            auth_manual_ms: 50,
            typing_delay_ms: 1,
            action_pause_ms: 1,
        },
        ..EngineConfig::default()
    };
    config.mapping_rules = vec![invoicerelay_core_types::MappingRule {
        pattern: "kiwiwaste".into(),
        replacement: "Kiwi Waste Services".into(),
    }];

    let task = AutomationTask::new("KIWIWASTE-006", "INV-3");
    let report = WorkflowEngine::new(config)
        .run(driver.as_ref(), &task, &log(), &CancellationToken::new())
        .await;

    // The run stalls at record resolution, but the typed term proves the
    // mapping short-circuit.
    assert_eq!(driver.typed(), "Kiwi Waste Services");
    assert!(matches!(
        report.error,
        Some(WorkflowError::RecordNotFound { .. })
    ));
}
