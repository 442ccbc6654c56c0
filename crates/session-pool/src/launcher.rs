use std::sync::Arc;

use async_trait::async_trait;
use browser_adapter::PageDriver;
use invoicerelay_core_types::SessionId;
use tempfile::TempDir;

use crate::error::PoolError;

/// A freshly launched browser page plus the scratch profile backing it.
/// The profile directory is deleted when the session leaves the pool.
pub struct LaunchedSession {
    pub driver: Arc<dyn PageDriver>,
    pub profile_dir: Option<TempDir>,
}

/// Launches isolated browser sessions. The production implementation starts
/// a Chrome process per call; tests substitute scripted drivers.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, session: &SessionId) -> Result<LaunchedSession, PoolError>;
}
