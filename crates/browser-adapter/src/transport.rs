//! DevTools Protocol transport.
//!
//! [`ChromiumTransport`] launches (or attaches to) a Chromium process and
//! pumps commands and responses over one websocket connection. Higher layers
//! only see the [`CdpTransport`] trait, which keeps them testable without a
//! real browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, MethodId, Message, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::util::extract_ws_url;

/// Whether a command addresses the browser endpoint or one attached target.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError>;

    /// False once the connection is gone, whether by crash, operator close
    /// or heartbeat failure.
    fn is_alive(&self) -> bool;

    /// Best-effort teardown of the underlying browser process.
    async fn shutdown(&self);
}

struct ControlMessage {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, DriverError>>,
}

/// Transport bound to one launched Chromium process.
pub struct ChromiumTransport {
    command_tx: mpsc::Sender<ControlMessage>,
    alive: Arc<AtomicBool>,
    loop_task: JoinHandle<()>,
    heartbeat_task: Option<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
    deadline: Duration,
}

impl ChromiumTransport {
    /// Launch a fresh browser (or attach when `websocket_url` is set) and
    /// start the command loop plus the liveness heartbeat.
    pub async fn launch(cfg: &DriverConfig) -> Result<Self, DriverError> {
        let (child, ws_url) = if let Some(url) = cfg.websocket_url.clone() {
            (None, url)
        } else {
            let browser_cfg = browser_config(cfg)?;
            let mut child = browser_cfg
                .launch()
                .map_err(|err| DriverError::Launch(format!("failed to launch chromium: {err}")))?;
            let ws_url = extract_ws_url(&mut child).await?;
            (Some(child), ws_url)
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| DriverError::Io(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(128);
        let alive = Arc::new(AtomicBool::new(true));

        let loop_alive = alive.clone();
        let loop_task = tokio::spawn(async move {
            if let Err(err) = run_loop(conn, command_rx).await {
                warn!(target: "browser-adapter", ?err, "transport loop terminated with error");
            }
            loop_alive.store(false, Ordering::Relaxed);
        });

        let heartbeat_task = spawn_heartbeat(
            command_tx.clone(),
            alive.clone(),
            Duration::from_millis(cfg.heartbeat_interval_ms),
        );

        info!(target: "browser-adapter", url = %ws_url, "chromium connection established");

        let transport = Self {
            command_tx,
            alive,
            loop_task,
            heartbeat_task,
            child: Mutex::new(child),
            deadline: Duration::from_millis(cfg.default_deadline_ms),
        };

        // Discovery must be on before Target.createTarget sessions attach.
        transport
            .send_command(
                CommandTarget::Browser,
                "Target.setDiscoverTargets",
                json!({ "discover": true }),
            )
            .await?;

        Ok(transport)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        if !self.is_alive() {
            return Err(DriverError::Closed);
        }

        let (resp_tx, resp_rx) = oneshot::channel();
        let message = ControlMessage {
            target,
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        self.command_tx
            .send(message)
            .await
            .map_err(|_| DriverError::Closed)?;

        match tokio::time::timeout(self.deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DriverError::Io("command response channel closed".into())),
            Err(_) => Err(DriverError::Timeout(method.to_string())),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn shutdown(&self) {
        let _ = self
            .send_command(CommandTarget::Browser, "Browser.close", json!({}))
            .await;
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
        if let Some(handle) = &self.heartbeat_task {
            handle.abort();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(target: "browser-adapter", ?err, "chromium child already gone");
            }
        }
    }
}

impl Drop for ChromiumTransport {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
        if let Some(handle) = &self.heartbeat_task {
            handle.abort();
        }
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "browser-adapter", ?err, "failed to kill chromium child");
                        }
                    });
                }
            }
        }
    }
}

fn spawn_heartbeat(
    sender: mpsc::Sender<ControlMessage>,
    alive: Arc<AtomicBool>,
    interval_duration: Duration,
) -> Option<JoinHandle<()>> {
    if interval_duration.as_millis() == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval(interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while alive.load(Ordering::Relaxed) {
            ticker.tick().await;
            if !alive.load(Ordering::Relaxed) {
                break;
            }

            let (resp_tx, resp_rx) = oneshot::channel();
            let message = ControlMessage {
                target: CommandTarget::Browser,
                method: "Browser.getVersion".to_string(),
                params: Value::Object(Default::default()),
                responder: resp_tx,
            };

            if sender.send(message).await.is_err() {
                break;
            }

            match tokio::time::timeout(Duration::from_secs(5), resp_rx).await {
                Ok(Ok(Ok(_))) => {}
                other => {
                    debug!(target: "browser-adapter", ?other, "heartbeat failed, marking transport dead");
                    alive.store(false, Ordering::Relaxed);
                    break;
                }
            }
        }
    }))
}

async fn run_loop(
    mut conn: Connection<CdpEventMessage>,
    mut command_rx: mpsc::Receiver<ControlMessage>,
) -> Result<(), DriverError> {
    let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, DriverError>>> = HashMap::new();

    loop {
        tokio::select! {
            Some(cmd) = command_rx.recv() => {
                submit(&mut conn, cmd, &mut inflight)?;
            }
            message = conn.next() => {
                match message {
                    Some(Ok(Message::Response(resp))) => {
                        dispatch_response(resp, &mut inflight);
                    }
                    Some(Ok(Message::Event(_))) => {
                        // Page lifecycle is observed by polling; raw events
                        // are drained to keep the connection healthy.
                    }
                    Some(Err(err)) => {
                        let failure = DriverError::Io(err.to_string());
                        for (_, sender) in inflight.drain() {
                            let _ = sender.send(Err(failure.clone()));
                        }
                        return Err(failure);
                    }
                    None => {
                        for (_, sender) in inflight.drain() {
                            let _ = sender.send(Err(DriverError::Closed));
                        }
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn submit(
    conn: &mut Connection<CdpEventMessage>,
    cmd: ControlMessage,
    inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, DriverError>>>,
) -> Result<(), DriverError> {
    let session = match cmd.target {
        CommandTarget::Browser => None,
        CommandTarget::Session(session_id) => Some(CdpSessionId::from(session_id)),
    };

    let method_id: MethodId = cmd.method.clone().into();
    match conn.submit_command(method_id, session, cmd.params) {
        Ok(call_id) => {
            inflight.insert(call_id, cmd.responder);
            Ok(())
        }
        Err(err) => {
            let failure = DriverError::Io(err.to_string());
            let _ = cmd.responder.send(Err(failure.clone()));
            Err(failure)
        }
    }
}

fn dispatch_response(
    resp: Response,
    inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, DriverError>>>,
) {
    let entry = inflight.remove(&resp.id);
    let result = if let Some(result) = resp.result {
        Ok(result)
    } else if let Some(error) = resp.error {
        Err(DriverError::Io(format!(
            "cdp error {}: {}",
            error.code, error.message
        )))
    } else {
        Err(DriverError::Protocol("empty cdp response".into()))
    };

    if let Some(sender) = entry {
        let _ = sender.send(result);
    }
}

fn browser_config(cfg: &DriverConfig) -> Result<BrowserConfig, DriverError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(DriverError::Launch(format!(
            "chrome executable not found at {}; set INVOICERELAY_CHROME",
            cfg.executable.display()
        )));
    }

    if cfg.user_data_dir.as_os_str().is_empty() {
        return Err(DriverError::Launch(
            "user_data_dir must be set; every session owns a scratch profile".into(),
        ));
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20));

    if !cfg.headless {
        builder = builder.with_head();
    }

    if std::env::var("INVOICERELAY_DISABLE_SANDBOX")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        builder = builder.no_sandbox();
    }

    let window = format!("--window-size={},{}", cfg.window_width, cfg.window_height);
    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-client-side-phishing-detection",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--metrics-recording-only",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
        window.as_str(),
    ];
    if cfg.headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder = builder.user_data_dir(cfg.user_data_dir.clone());

    builder
        .build()
        .map_err(|err| DriverError::Launch(format!("browser config error: {err}")))
}
