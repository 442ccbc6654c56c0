//! Bounded pool of live browser sessions.
//!
//! At most `capacity` sessions exist at once, counting both open browsers
//! and launches in flight. Requests beyond capacity queue FIFO and are
//! granted as slots free up, whether by explicit release or because the
//! operator closed a browser window by hand.

mod error;
mod launcher;
mod pool;

pub use error::PoolError;
pub use launcher::{LaunchedSession, SessionLauncher};
pub use pool::{PoolSession, PoolStats, SessionPool};
