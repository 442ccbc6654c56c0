//! The record-update workflow: authenticate, select the record, open its
//! commitment section, locate the item, apply the field updates.
//!
//! Strictly sequential per session. Steps confirm their UI effect before the
//! ledger is marked, so a returned ledger always understates rather than
//! overstates what happened in the browser. The browser is deliberately left
//! open at the end of every run; a human reviews and saves.

pub mod auth;
pub mod engine;
pub mod errors;
pub mod selectors;
mod waits;

pub use engine::{AutomationReport, WorkflowEngine};
pub use errors::WorkflowError;
