//! Per-session log fan-out.
//!
//! Every automation session owns its own broadcast channel, so a consumer
//! watching session A never receives events for session B. Publishing to a
//! session with no subscribers is a silent no-op; events published before
//! the first subscription are dropped, not replayed.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use invoicerelay_core_types::{LogEvent, LogLevel, SessionId, TaskHandle};

const CHANNEL_CAPACITY: usize = 256;

/// Routes [`LogEvent`]s to subscribers of the event's session.
pub struct SessionBroadcaster {
    channels: DashMap<SessionId, broadcast::Sender<LogEvent>>,
}

impl SessionBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
        })
    }

    fn sender(&self, session: &SessionId) -> broadcast::Sender<LogEvent> {
        self.channels
            .entry(session.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Deliver `event` to every subscriber of its session. Lagging or absent
    /// subscribers never block the publisher.
    pub fn publish(&self, event: LogEvent) {
        let _ = self.sender(&event.session_id).send(event);
    }

    /// Subscribe to one session's stream, starting from now.
    pub fn subscribe(&self, session: &SessionId) -> broadcast::Receiver<LogEvent> {
        self.sender(session).subscribe()
    }

    /// Drop a finished session's channel. Existing receivers observe channel
    /// close; later publishes to the same id recreate the channel.
    pub fn drop_session(&self, session: &SessionId) {
        if self.channels.remove(session).is_some() {
            debug!(session = %session, "dropped log channel");
        }
    }

    pub fn session_count(&self) -> usize {
        self.channels.len()
    }
}

/// Emitter bound to one session and, optionally, one task. Stamps events
/// and mirrors them onto the process-wide tracing output.
#[derive(Clone)]
pub struct SessionLog {
    broadcaster: Arc<SessionBroadcaster>,
    session: SessionId,
    task: Option<TaskHandle>,
}

impl SessionLog {
    pub fn new(broadcaster: Arc<SessionBroadcaster>, session: SessionId) -> Self {
        Self {
            broadcaster,
            session,
            task: None,
        }
    }

    pub fn for_task(&self, task: TaskHandle) -> Self {
        Self {
            broadcaster: Arc::clone(&self.broadcaster),
            session: self.session.clone(),
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(session = %self.session, "{message}")
            }
            LogLevel::Warning => tracing::warn!(session = %self.session, "{message}"),
            LogLevel::Error => tracing::error!(session = %self.session, "{message}"),
        }
        self.broadcaster.publish(LogEvent {
            timestamp: Utc::now(),
            level,
            message,
            session_id: self.session.clone(),
            task: self.task,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(LogLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message);
    }
}
