//! Chromium driving for invoicerelay sessions.
//!
//! The adapter speaks raw DevTools Protocol over a [`transport::CdpTransport`]
//! and exposes the small [`driver::PageDriver`] surface the locator and
//! workflow layers are written against. Each driver owns exactly one page in
//! one browser process launched with its own scratch profile directory, so
//! concurrent sessions share no cookies, storage or in-flight UI state.

pub mod config;
pub mod driver;
pub mod error;
pub mod transport;
mod util;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::DriverConfig;
pub use driver::{CdpDriver, ElementHit, NodeRef, PageDriver};
pub use error::DriverError;
pub use transport::{ChromiumTransport, CommandTarget};
