//! Authentication bootstrap.
//!
//! The engine never owns credentials handling beyond an optional auto-fill:
//! when the landing page turns out to be a login wall, stored credentials
//! are typed in if present, and then the workflow simply waits for the wall
//! to go away. That covers both the happy path and manual completion of
//! two-factor prompts, at the cost of a long fallback wait.

use std::time::Duration;

use browser_adapter::PageDriver;
use invoicerelay_core_types::EngineConfig;
use invoicerelay_event_log::SessionLog;
use record_locator::MatchMode;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::WorkflowError;
use crate::selectors;
use crate::waits::{checkpoint, poll_find};

const AUTH_POLL: Duration = Duration::from_secs(2);

pub(crate) fn is_login_wall(url: &str) -> bool {
    let lowered = url.to_lowercase();
    lowered.contains("login") || lowered.contains("signin")
}

/// Navigate to the configured home view and wait until it is authenticated.
pub async fn authenticate(
    driver: &dyn PageDriver,
    config: &EngineConfig,
    log: &SessionLog,
    cancel: &CancellationToken,
) -> Result<(), WorkflowError> {
    let timing = &config.timing;

    driver.navigate(&config.target_url).await?;
    sleep(Duration::from_millis(timing.action_pause_ms)).await;

    if !is_login_wall(&driver.current_url().await?) {
        log.info("already authenticated");
        return Ok(());
    }
    log.info("login wall detected");

    if let Some(email) = &config.credentials.email {
        fill_login_form(driver, config, email, log, cancel).await?;

        let primary = Duration::from_millis(timing.auth_primary_ms);
        if wait_for_authenticated(driver, primary, cancel).await? {
            return Ok(());
        }
        log.warning(format!(
            "still on the login wall; waiting up to {}s for manual completion",
            timing.auth_manual_ms / 1000
        ));
    } else {
        log.info(format!(
            "no stored credentials; waiting up to {}s for manual login",
            timing.auth_manual_ms / 1000
        ));
    }
    let manual = Duration::from_millis(timing.auth_manual_ms);
    if wait_for_authenticated(driver, manual, cancel).await? {
        return Ok(());
    }

    Err(WorkflowError::AuthenticationTimeout)
}

async fn fill_login_form(
    driver: &dyn PageDriver,
    config: &EngineConfig,
    email: &str,
    log: &SessionLog,
    cancel: &CancellationToken,
) -> Result<(), WorkflowError> {
    let timing = &config.timing;
    let short = Duration::from_millis(timing.short_wait_ms);

    let Some(field) = poll_find(
        driver,
        &selectors::email_inputs(),
        "",
        MatchMode::Contains,
        short,
        cancel,
    )
    .await?
    else {
        log.warning("email field not found; waiting for manual login");
        return Ok(());
    };
    // Auto-fill only applies to an untouched form.
    if !driver.read_value(field.node).await?.trim().is_empty() {
        log.info("login form already has input; waiting for manual completion");
        return Ok(());
    }
    driver.fill(field.node, email).await?;
    driver.press_enter().await?;
    sleep(Duration::from_millis(timing.action_pause_ms)).await;

    if let Some(password) = &config.credentials.password {
        let Some(field) = poll_find(
            driver,
            &selectors::password_inputs(),
            "",
            MatchMode::Contains,
            short,
            cancel,
        )
        .await?
        else {
            log.warning("password field did not appear; waiting for manual login");
            return Ok(());
        };
        driver.fill(field.node, password).await?;
        driver.press_enter().await?;
        log.info("submitted stored credentials");
    }
    Ok(())
}

/// True once the location no longer looks like a login wall.
async fn wait_for_authenticated(
    driver: &dyn PageDriver,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<bool, WorkflowError> {
    let start = Instant::now();
    loop {
        checkpoint(cancel)?;
        if !is_login_wall(&driver.current_url().await?) {
            return Ok(true);
        }
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return Ok(false);
        }
        sleep(AUTH_POLL.min(deadline - elapsed)).await;
    }
}
