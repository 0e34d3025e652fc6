//! Resolves the filesystem/database locations the orchestrator operates under.
use std::{
    env,
    path::PathBuf,
    sync::{OnceLock, RwLock},
    time::Duration,
};

#[cfg(test)]
use std::path::Path;

use crate::constants::DEFAULT_HEALTH_CHECK_INTERVAL;

/// Resolved set of paths and tunables the orchestrator reads at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    script_root: PathBuf,
    data_dir: PathBuf,
    database_url: String,
    health_check_interval: Duration,
}

static CONTEXT: OnceLock<RwLock<RuntimeConfig>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeConfig> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeConfig::from_env()))
}

impl RuntimeConfig {
    fn from_env() -> Self {
        let script_root = env::var_os("SCRIPT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/scripts"));
        let data_dir = env::var_os("ORCHESTRATOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/data"));
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| data_dir.join("orchestrator.db").to_string_lossy().into_owned());
        let health_check_interval = env::var("HEALTH_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL);

        Self {
            script_root,
            data_dir,
            database_url,
            health_check_interval,
        }
    }

    fn from_root(root: PathBuf) -> Self {
        let data_dir = root.join("data");
        let script_root = root.join("scripts");
        let database_url = data_dir.join("orchestrator.db").to_string_lossy().into_owned();
        Self {
            script_root,
            data_dir,
            database_url,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }
}

/// Re-reads the runtime configuration from the process environment. Subsequent calls overwrite
/// the active configuration, which lets a long-running process (e.g. the CLI test harness)
/// re-resolve paths after changing environment variables.
pub fn init() {
    let mut guard = context_lock().write().expect("runtime context poisoned");
    *guard = RuntimeConfig::from_env();
}

/// Points the orchestrator at an isolated root directory; only meant for tests.
#[cfg(test)]
pub fn init_with_test_root(root: &Path) {
    let mut guard = context_lock().write().expect("runtime context poisoned");
    *guard = RuntimeConfig::from_root(root.to_path_buf());
}

/// Directory scanned for script files during disk-sync.
pub fn script_root() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .script_root
        .clone()
}

/// Base directory for all orchestrator-owned state.
pub fn data_dir() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .data_dir
        .clone()
}

/// Directory holding per-script log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Directory holding backup archives produced by the external backup collaborator.
pub fn backup_dir() -> PathBuf {
    data_dir().join("backups")
}

/// Directory holding transient runtime state (persisted job-scheduler state).
pub fn runtime_dir() -> PathBuf {
    data_dir().join("run")
}

/// Connection string for the persistent catalog store.
pub fn database_url() -> String {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .database_url
        .clone()
}

/// Cadence at which the health checker sweeps daemon status.
pub fn health_check_interval() -> Duration {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .health_check_interval
}

/// Cron expression for [`health_check_interval`], in whole minutes (the cron scheduler's
/// finest granularity). Sub-minute intervals round up to every minute.
pub fn health_check_cron_expression() -> String {
    let minutes = (health_check_interval().as_secs() / 60).max(1);
    format!("*/{minutes} * * * *")
}
