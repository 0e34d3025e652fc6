//! Error taxonomy for the script orchestrator.
use thiserror::Error;

/// Errors raised by the catalog adapter (persistent script/setting store).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying SQLite error.
    #[error("catalog database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error while reading/writing a script file.
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lookup by id or name found no record.
    #[error("script '{0}' not found in catalog")]
    NotFound(String),

    /// Insert violated the unique-path invariant (§3.1).
    #[error("a script already exists at path {0}")]
    DuplicatePath(String),
}

/// Errors raised by the process supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Catalog lookup failed while resolving a script to run.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Failed to spawn the child process.
    #[error("failed to start script '{name}': {source}")]
    SpawnFailed {
        /// Script name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Signal delivery to a process group failed for a reason other than "already gone".
    #[error("failed to signal script '{name}': {source}")]
    SignalFailed {
        /// Script name.
        name: String,
        /// Underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    /// Error for poisoned mutex guarding the live-children table.
    #[error("supervisor state mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Log sink error surfaced while preparing a run.
    #[error(transparent)]
    Logs(#[from] LogsError),
}

impl<T> From<std::sync::PoisonError<T>> for SupervisorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SupervisorError::MutexPoisoned(err.to_string())
    }
}

/// Errors raised by the job registry / scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {source}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Underlying parser error.
        #[source]
        source: cron::error::Error,
    },

    /// Catalog access failed while registering or reading jobs.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Error for poisoned mutex guarding the job table.
    #[error("scheduler state mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Error reading/writing the persisted job-state file.
    #[error("failed to persist job state: {0}")]
    StatePersist(#[from] std::io::Error),

    /// Error (de)serializing the persisted job-state file.
    #[error("failed to (de)serialize job state: {0}")]
    StateSerde(#[from] serde_json::Error),
}

impl<T> From<std::sync::PoisonError<T>> for SchedulerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SchedulerError::MutexPoisoned(err.to_string())
    }
}

/// Errors raised by the log sink / tail streaming.
#[derive(Debug, Error)]
pub enum LogsError {
    /// Filesystem error opening, writing, or reading a log file.
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the outbound notifier.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Transport-level failure talking to the chat vendor endpoint.
    #[error("notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Chat credentials are not configured; caller should treat this as a no-op, not a failure.
    #[error("chat credentials are not configured")]
    NotConfigured,
}

/// Top-level error returned to the CLI boundary.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Catalog adapter error.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Process supervisor error.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Scheduler error.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Log sink error.
    #[error(transparent)]
    Logs(#[from] LogsError),

    /// Notifier error (rarely surfaced; notifications are normally swallowed).
    #[error(transparent)]
    Notifier(#[from] NotifierError),

    /// Generic I/O error (disk-sync, CLI argument handling, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
