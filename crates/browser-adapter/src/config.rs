//! Launch configuration and Chromium executable discovery.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use which::which;

/// Configuration for launching one isolated browser session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverConfig {
    pub executable: PathBuf,
    /// Scratch profile directory. Exclusively owned by the session; the pool
    /// deletes it on release.
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Per-command deadline.
    pub default_deadline_ms: u64,
    /// Liveness probe interval; also how fast external closure is noticed.
    pub heartbeat_interval_ms: u64,
    /// Attach to an already-running browser instead of launching one.
    pub websocket_url: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: PathBuf::new(),
            headless: false,
            window_width: 1920,
            window_height: 1080,
            default_deadline_ms: 30_000,
            heartbeat_interval_ms: 1_000,
            websocket_url: None,
        }
    }
}

impl DriverConfig {
    pub fn with_profile_dir(mut self, dir: PathBuf) -> Self {
        self.user_data_dir = dir;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

/// Locate a Chromium-family executable: explicit env override first, then
/// well-known binary names on PATH, then platform install locations.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("INVOICERELAY_CHROME") {
        let path = PathBuf::from(raw.trim());
        if path.exists() {
            return Some(path);
        }
    }

    const CANDIDATES: [&str; 6] = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "msedge",
    ];
    for name in CANDIDATES {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    const INSTALL_PATHS: [&str; 4] = [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    INSTALL_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_headful() {
        let cfg = DriverConfig::default();
        assert!(!cfg.headless);
        assert_eq!(cfg.default_deadline_ms, 30_000);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = DriverConfig::default()
            .with_profile_dir(PathBuf::from("/tmp/p"))
            .with_headless(true);
        assert!(cfg.headless);
        assert_eq!(cfg.user_data_dir, PathBuf::from("/tmp/p"));
    }
}
