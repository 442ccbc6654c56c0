use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use browser_adapter::PageDriver;
use invoicerelay_core_types::{SessionId, TaskHandle};

use crate::error::PoolError;
use crate::launcher::SessionLauncher;

struct ActiveSession {
    session_id: SessionId,
    driver: Arc<dyn PageDriver>,
    created_at: Instant,
    // Held so the scratch profile outlives the browser using it.
    _profile_dir: Option<TempDir>,
}

#[derive(Default)]
struct PoolInner {
    active: HashMap<TaskHandle, ActiveSession>,
    launching: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
    closed: bool,
}

/// A granted pool slot: the live page plus the handle used to release it.
pub struct PoolSession {
    pub handle: TaskHandle,
    pub session_id: SessionId,
    pub driver: Arc<dyn PageDriver>,
}

impl std::fmt::Debug for PoolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSession")
            .field("handle", &self.handle)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolStats {
    pub active: usize,
    pub launching: usize,
    pub queued: usize,
}

/// Bounded session pool. `active + launching` never exceeds capacity;
/// everything else waits in arrival order.
pub struct SessionPool {
    capacity: usize,
    launcher: Arc<dyn SessionLauncher>,
    inner: Mutex<PoolInner>,
}

impl SessionPool {
    /// Create the pool and start the liveness monitor, which polls every
    /// `monitor_interval` for browsers the operator closed out-of-band.
    pub fn new(
        capacity: usize,
        launcher: Arc<dyn SessionLauncher>,
        monitor_interval: Duration,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            capacity: capacity.max(1),
            launcher,
            inner: Mutex::new(PoolInner::default()),
        });

        let weak = Arc::downgrade(&pool);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(monitor_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.inner.lock().closed {
                    break;
                }
                pool.reap_dead();
            }
        });

        pool
    }

    /// Acquire a slot and launch a fresh browser session in it.
    ///
    /// Queues FIFO when the pool is full. A failed launch frees the slot
    /// and serves the queue before the error is returned.
    pub async fn acquire(&self, session_id: SessionId) -> Result<PoolSession, PoolError> {
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(PoolError::Closed);
            }
            if inner.active.len() + inner.launching < self.capacity {
                inner.launching += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                debug!(session = %session_id, queued = inner.waiters.len(), "pool full, queueing");
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // The granter reserves the slot before signalling.
            rx.await.map_err(|_| PoolError::Closed)?;
        }

        // Releases the reserved slot if this future is dropped mid-launch
        // or the launch fails.
        let mut slot = SlotGuard {
            pool: self,
            armed: true,
        };

        match self.launcher.launch(&session_id).await {
            Ok(launched) => {
                let handle = TaskHandle::new();
                let driver = Arc::clone(&launched.driver);
                let mut inner = self.inner.lock();
                inner.launching -= 1;
                slot.armed = false;
                inner.active.insert(
                    handle,
                    ActiveSession {
                        session_id: session_id.clone(),
                        driver: Arc::clone(&launched.driver),
                        created_at: Instant::now(),
                        _profile_dir: launched.profile_dir,
                    },
                );
                info!(session = %session_id, %handle, active = inner.active.len(), "session launched");
                Ok(PoolSession {
                    handle,
                    session_id,
                    driver,
                })
            }
            Err(err) => {
                warn!(session = %session_id, error = %err, "session launch failed");
                Err(err)
            }
        }
    }

    /// Close a session's browser and return its slot to the pool.
    /// Unknown handles (already reaped) are a no-op.
    pub async fn release(&self, handle: TaskHandle) {
        let removed = self.inner.lock().active.remove(&handle);
        let Some(session) = removed else { return };

        session.driver.close().await;
        info!(
            session = %session.session_id,
            %handle,
            lived = ?session.created_at.elapsed(),
            "session released"
        );

        let mut inner = self.inner.lock();
        Self::grant_next(self.capacity, &mut inner);
    }

    /// Return a slot without touching the browser. Used when the run leaves
    /// the window open for the operator.
    pub fn detach(&self, handle: TaskHandle) {
        let mut inner = self.inner.lock();
        if inner.active.remove(&handle).is_some() {
            debug!(%handle, "session detached");
            Self::grant_next(self.capacity, &mut inner);
        }
    }

    /// Drop sessions whose browser has died and serve the queue with the
    /// recovered slots.
    pub fn reap_dead(&self) {
        let mut inner = self.inner.lock();
        let dead: Vec<TaskHandle> = inner
            .active
            .iter()
            .filter(|(_, s)| !s.driver.is_alive())
            .map(|(h, _)| *h)
            .collect();
        for handle in dead {
            if let Some(session) = inner.active.remove(&handle) {
                warn!(
                    session = %session.session_id,
                    %handle,
                    lived = ?session.created_at.elapsed(),
                    "browser closed externally, reclaiming slot"
                );
            }
            Self::grant_next(self.capacity, &mut inner);
        }
    }

    /// Close every session and fail all queued waiters.
    pub async fn shutdown(&self) {
        let drained: Vec<ActiveSession> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.waiters.clear();
            inner.active.drain().map(|(_, s)| s).collect()
        };
        for session in drained {
            session.driver.close().await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            active: inner.active.len(),
            launching: inner.launching,
            queued: inner.waiters.len(),
        }
    }

    fn grant_next(capacity: usize, inner: &mut PoolInner) {
        while inner.active.len() + inner.launching < capacity {
            let Some(tx) = inner.waiters.pop_front() else { break };
            inner.launching += 1;
            if tx.send(()).is_err() {
                // Waiter gave up; return the slot and try the next one.
                inner.launching -= 1;
            }
        }
    }
}

struct SlotGuard<'a> {
    pool: &'a SessionPool,
    armed: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.pool.inner.lock();
            inner.launching -= 1;
            SessionPool::grant_next(self.pool.capacity, &mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use browser_adapter::testing::FakeDriver;
    use browser_adapter::DriverError;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::launcher::LaunchedSession;

    #[derive(Default)]
    struct FakeLauncher {
        fail_next: AtomicBool,
        launched: Mutex<Vec<Arc<FakeDriver>>>,
    }

    impl FakeLauncher {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn fail_next(&self) {
            self.fail_next.store(true, Ordering::Relaxed);
        }

        fn launched(&self) -> Vec<Arc<FakeDriver>> {
            self.launched.lock().clone()
        }
    }

    #[async_trait]
    impl SessionLauncher for FakeLauncher {
        async fn launch(&self, _session: &SessionId) -> Result<LaunchedSession, PoolError> {
            if self.fail_next.swap(false, Ordering::Relaxed) {
                return Err(PoolError::Launch(DriverError::Launch(
                    "no executable".into(),
                )));
            }
            let driver = FakeDriver::new();
            self.launched.lock().push(Arc::clone(&driver));
            Ok(LaunchedSession {
                driver,
                profile_dir: None,
            })
        }
    }

    fn pool_with(capacity: usize) -> (Arc<SessionPool>, Arc<FakeLauncher>) {
        let launcher = FakeLauncher::new();
        let pool = SessionPool::new(
            capacity,
            Arc::clone(&launcher) as Arc<dyn SessionLauncher>,
            Duration::from_millis(20),
        );
        (pool, launcher)
    }

    #[tokio::test]
    async fn capacity_bounds_concurrent_sessions() {
        let (pool, _) = pool_with(2);
        let s1 = pool.acquire(SessionId::new()).await.unwrap();
        let _s2 = pool.acquire(SessionId::new()).await.unwrap();
        assert_eq!(pool.stats().active, 2);

        let queued_pool = Arc::clone(&pool);
        let third = tokio::spawn(async move { queued_pool.acquire(SessionId::new()).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.stats().queued, 1);
        assert_eq!(pool.stats().active, 2);

        pool.release(s1.handle).await;
        let granted = third.await.unwrap().unwrap();
        assert_eq!(pool.stats().active, 2);
        assert_eq!(pool.stats().queued, 0);
        drop(granted);
    }

    #[tokio::test]
    async fn queue_is_served_in_arrival_order() {
        let (pool, _) = pool_with(1);
        let first = pool.acquire(SessionId::new()).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for tag in ["second", "third"] {
            let pool = Arc::clone(&pool);
            let tx = tx.clone();
            tokio::spawn(async move {
                let session = pool.acquire(SessionId::new()).await.unwrap();
                let _ = tx.send((tag, session.handle));
            });
            // Deterministic arrival order.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(pool.stats().queued, 2);

        pool.release(first.handle).await;
        let (tag, handle) = rx.recv().await.unwrap();
        assert_eq!(tag, "second");

        pool.release(handle).await;
        let (tag, _) = rx.recv().await.unwrap();
        assert_eq!(tag, "third");
    }

    #[tokio::test]
    async fn failed_launch_frees_the_slot() {
        let (pool, launcher) = pool_with(1);
        launcher.fail_next();

        let err = pool.acquire(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, PoolError::Launch(_)));
        assert_eq!(pool.stats(), PoolStats { active: 0, launching: 0, queued: 0 });

        // The slot is usable again.
        let session = pool.acquire(SessionId::new()).await.unwrap();
        assert_eq!(pool.stats().active, 1);
        drop(session);
    }

    #[tokio::test]
    async fn externally_closed_browser_is_reaped_and_queue_served() {
        let (pool, launcher) = pool_with(1);
        let _first = pool.acquire(SessionId::new()).await.unwrap();

        let queued_pool = Arc::clone(&pool);
        let waiting = tokio::spawn(async move { queued_pool.acquire(SessionId::new()).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.stats().queued, 1);

        // Operator closes the browser window by hand.
        launcher.launched()[0].kill();

        let granted = waiting.await.unwrap().unwrap();
        assert_eq!(pool.stats().active, 1);
        drop(granted);
    }

    #[tokio::test]
    async fn release_closes_the_browser() {
        let (pool, launcher) = pool_with(1);
        let session = pool.acquire(SessionId::new()).await.unwrap();
        pool.release(session.handle).await;

        assert!(launcher.launched()[0].was_closed());
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn detach_frees_slot_without_closing() {
        let (pool, launcher) = pool_with(1);
        let session = pool.acquire(SessionId::new()).await.unwrap();
        pool.detach(session.handle);

        assert!(!launcher.launched()[0].was_closed());
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn shutdown_fails_queued_waiters() {
        let (pool, _) = pool_with(1);
        let _held = pool.acquire(SessionId::new()).await.unwrap();

        let queued_pool = Arc::clone(&pool);
        let waiting = tokio::spawn(async move { queued_pool.acquire(SessionId::new()).await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        pool.shutdown().await;
        assert!(matches!(waiting.await.unwrap(), Err(PoolError::Closed)));
    }
}
