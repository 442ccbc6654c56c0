//! invoicerelay: replicates extracted invoice fields into a third-party
//! project-management web application by driving a real browser.
//!
//! The [`Engine`] ties the layers together: a bounded pool of isolated
//! browser sessions, a per-session log broadcaster, and the five-step
//! record-update workflow. Submitting a task drives one full run; the
//! browser window is left open afterwards so an operator can review and
//! save, and its pool slot is reclaimed when the window is closed.

pub mod config;
mod launcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use invoicerelay_core_types::{AutomationTask, EngineConfig, LogEvent, SessionId, TaskHandle};
use invoicerelay_event_log::{SessionBroadcaster, SessionLog};
use invoicerelay_session_pool::{PoolError, PoolStats, SessionLauncher, SessionPool};
use workflow_engine::WorkflowEngine;

pub use launcher::ChromeSessionLauncher;
pub use workflow_engine::{AutomationReport, WorkflowError};

const POOL_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum EngineError {
    /// Attachment paths are checked before a browser is ever launched.
    #[error("attachment does not exist: {}", .0.display())]
    MissingAttachment(PathBuf),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A completed submission: the workflow report plus the pool handle of the
/// browser that is still open for review.
#[derive(Debug)]
pub struct Submission {
    pub handle: TaskHandle,
    pub report: AutomationReport,
}

pub struct Engine {
    pool: Arc<SessionPool>,
    broadcaster: Arc<SessionBroadcaster>,
    workflow: WorkflowEngine,
    cancellations: Mutex<HashMap<SessionId, CancellationToken>>,
    // Handle -> session id, so release can prune the session's log channel.
    sessions: Mutex<HashMap<TaskHandle, SessionId>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let launcher = ChromeSessionLauncher::new(config.headless);
        Self::with_launcher(config, launcher)
    }

    /// Wire the engine with a custom launcher. Tests inject scripted
    /// drivers through this.
    pub fn with_launcher(config: EngineConfig, launcher: Arc<dyn SessionLauncher>) -> Self {
        let pool = SessionPool::new(config.pool_capacity, launcher, POOL_MONITOR_INTERVAL);
        Self {
            pool,
            broadcaster: SessionBroadcaster::new(),
            workflow: WorkflowEngine::new(config),
            cancellations: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Live progress events for one session, starting from now.
    pub fn subscribe(&self, session: &SessionId) -> broadcast::Receiver<LogEvent> {
        self.broadcaster.subscribe(session)
    }

    /// Run one task end to end: acquire a session (waiting if the pool is
    /// full), drive the workflow, report the ledger. The session stays
    /// open and occupied until [`Engine::release`] or the operator closes
    /// the window.
    pub async fn submit(&self, task: AutomationTask) -> Result<Submission, EngineError> {
        for path in &task.attachment_paths {
            if !path.exists() {
                return Err(EngineError::MissingAttachment(path.clone()));
            }
        }

        let session_id = task.session_id.clone();
        let log = SessionLog::new(Arc::clone(&self.broadcaster), session_id.clone());

        log.info("waiting for a browser session");
        let session = self.pool.acquire(session_id.clone()).await?;
        self.sessions
            .lock()
            .insert(session.handle, session_id.clone());
        let log = log.for_task(session.handle);

        let cancel = CancellationToken::new();
        self.cancellations
            .lock()
            .insert(session_id.clone(), cancel.clone());

        let report = self
            .workflow
            .run(session.driver.as_ref(), &task, &log, &cancel)
            .await;

        self.cancellations.lock().remove(&session_id);
        Ok(Submission {
            handle: session.handle,
            report,
        })
    }

    /// Cancel the run bound to `session`, if one is in flight. Takes effect
    /// at the next step boundary.
    pub fn cancel(&self, session: &SessionId) {
        if let Some(token) = self.cancellations.lock().get(session) {
            token.cancel();
        }
    }

    /// Close a reviewed session's browser, free its pool slot, and prune
    /// its log channel.
    pub async fn release(&self, handle: TaskHandle) {
        self.pool.release(handle).await;
        if let Some(session_id) = self.sessions.lock().remove(&handle) {
            self.broadcaster.drop_session(&session_id);
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Close every open browser and refuse further submissions.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        for (_, session_id) in self.sessions.lock().drain() {
            self.broadcaster.drop_session(&session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use browser_adapter::testing::FakeDriver;
    use invoicerelay_core_types::{LogLevel, TimingConfig};
    use invoicerelay_session_pool::LaunchedSession;

    struct BlankPageLauncher;

    #[async_trait]
    impl SessionLauncher for BlankPageLauncher {
        async fn launch(&self, _session: &SessionId) -> Result<LaunchedSession, PoolError> {
            Ok(LaunchedSession {
                driver: FakeDriver::new(),
                profile_dir: None,
            })
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
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
        }
    }

    #[tokio::test]
    async fn missing_attachment_is_rejected_before_launch() {
        let engine = Engine::with_launcher(fast_config(), Arc::new(BlankPageLauncher));
        let task = AutomationTask::new("ACME-012", "INV-77")
            .with_attachments(vec![PathBuf::from("/nonexistent/invoice.pdf")]);

        let err = engine.submit(task).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingAttachment(_)));
        assert_eq!(engine.pool_stats().active, 0);
    }

    #[tokio::test]
    async fn submit_streams_events_and_keeps_the_session_open() {
        let engine = Engine::with_launcher(fast_config(), Arc::new(BlankPageLauncher));
        let session_id = SessionId::new();
        let mut events = engine.subscribe(&session_id);

        // A blank page authenticates but has no picker, so the run stops
        // early; the session still occupies its slot for review.
        let task = AutomationTask::new("ACME-012", "INV-77").with_session_id(session_id.clone());
        let submission = engine.submit(task).await.unwrap();

        assert!(!submission.report.success);
        assert!(submission.report.ledger.authenticate);
        assert_eq!(engine.pool_stats().active, 1);

        let first = events.recv().await.unwrap();
        assert_eq!(first.level, LogLevel::Info);
        assert_eq!(first.session_id, session_id);

        engine.release(submission.handle).await;
        assert_eq!(engine.pool_stats().active, 0);
    }

    #[tokio::test]
    async fn release_prunes_the_session_log_channel() {
        let engine = Engine::with_launcher(fast_config(), Arc::new(BlankPageLauncher));
        let session_id = SessionId::new();
        let _events = engine.subscribe(&session_id);

        let task = AutomationTask::new("ACME-012", "INV-77").with_session_id(session_id.clone());
        let submission = engine.submit(task).await.unwrap();
        assert_eq!(engine.broadcaster.session_count(), 1);

        engine.release(submission.handle).await;
        assert_eq!(engine.broadcaster.session_count(), 0);
    }
}
