//! Pool-level behaviour through the public engine API: capacity bounds
//! concurrent browsers, extra submissions queue, released slots are
//! handed to the oldest waiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use browser_adapter::testing::FakeDriver;
use invoicerelay::{Engine, Submission};
use invoicerelay_core_types::{AutomationTask, EngineConfig, SessionId, TimingConfig};
use invoicerelay_session_pool::{LaunchedSession, PoolError, SessionLauncher};

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

fn config(capacity: usize) -> EngineConfig {
    EngineConfig {
        target_url: "https://app.example/home".into(),
        pool_capacity: capacity,
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
async fn submissions_beyond_capacity_queue_until_a_release() {
    let engine = Arc::new(Engine::with_launcher(
        config(2),
        Arc::new(BlankPageLauncher),
    ));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Submission>();
    for _ in 0..3 {
        let engine = Arc::clone(&engine);
        let tx = tx.clone();
        tokio::spawn(async move {
            let task = AutomationTask::new("ACME-012", "INV-77");
            let submission = engine.submit(task).await.unwrap();
            let _ = tx.send(submission);
        });
    }

    // Two runs finish (and keep their browsers open); the third is parked.
    let first = rx.recv().await.unwrap();
    let _second = rx.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = engine.pool_stats();
    assert_eq!(stats.active, 2);
    assert_eq!(stats.queued, 1);

    engine.release(first.handle).await;
    let third = rx.recv().await.unwrap();
    assert!(third.report.ledger.authenticate);
    assert_eq!(engine.pool_stats().active, 2);
    assert_eq!(engine.pool_stats().queued, 0);
}
