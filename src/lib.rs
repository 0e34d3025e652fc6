//! Self-hosted script orchestrator: catalog, scheduler, process supervisor, log sink,
//! health checker, and notifier for user-supplied scripts.

/// Persistent store for script and setting records.
pub mod catalog;

/// CLI parsing.
pub mod cli;

/// Constants.
pub mod constants;

/// Job registry / scheduler.
pub mod cron;

/// Errors.
pub mod error;

/// Health checker.
pub mod health;

/// Log sink and tail streaming.
pub mod logs;

/// Outbound chat notifications.
pub mod notifier;

/// Startup/shutdown lifecycle wiring.
pub mod bootstrap;

/// Process supervisor.
pub mod supervisor;

/// Runtime paths and tunables.
pub mod runtime;

/// Test utils.
#[doc(hidden)]
pub mod test_utils;
