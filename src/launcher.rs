//! Production session launcher: one Chrome process per pool slot, each with
//! its own scratch profile directory.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::info;

use browser_adapter::{CdpDriver, ChromiumTransport, DriverConfig, DriverError};
use invoicerelay_core_types::SessionId;
use invoicerelay_session_pool::{LaunchedSession, PoolError, SessionLauncher};

pub struct ChromeSessionLauncher {
    headless: bool,
}

impl ChromeSessionLauncher {
    pub fn new(headless: bool) -> Arc<Self> {
        Arc::new(Self { headless })
    }
}

#[async_trait]
impl SessionLauncher for ChromeSessionLauncher {
    async fn launch(&self, session: &SessionId) -> Result<LaunchedSession, PoolError> {
        let profile = TempDir::new().map_err(|err| {
            PoolError::Launch(DriverError::Launch(format!(
                "cannot create profile directory: {err}"
            )))
        })?;

        let config = DriverConfig::default()
            .with_profile_dir(profile.path().to_path_buf())
            .with_headless(self.headless);
        info!(session = %session, profile = %profile.path().display(), "launching browser");

        let transport = ChromiumTransport::launch(&config)
            .await
            .map_err(PoolError::Launch)?;
        let driver = CdpDriver::attach(Arc::new(transport))
            .await
            .map_err(PoolError::Launch)?;

        Ok(LaunchedSession {
            driver: Arc::new(driver),
            profile_dir: Some(profile),
        })
    }
}
