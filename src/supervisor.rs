//! Process supervisor: launches scripts as children, captures their output, enforces
//! single-instance semantics, and exposes graceful-then-forceful termination (§4.1, §5).

#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::{
    collections::HashMap,
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tracing::{debug, info, warn};

use crate::{
    catalog::{Catalog, Script, ScriptStatus, ScriptType},
    constants::{
        DEFAULT_INTERPRETER, DEFAULT_SHELL, INTERPRETER_UNBUFFERED_FLAG, LINE_BUFFER_STDERR_FLAG,
        LINE_BUFFER_STDOUT_FLAG, LINE_BUFFER_WRAPPER, STOP_GRACE_PERIOD, STOP_KILL_WAIT,
    },
    error::SupervisorError,
    logs,
    notifier::Notifier,
};

/// Callback invoked once a dispatched run has produced a terminal status; used by the
/// scheduler to close out a job's execution record without the supervisor needing to
/// know anything about jobs (§4.2).
pub type CompletionCallback = Box<dyn FnOnce(ScriptStatus) + Send + 'static>;

/// Launches and tracks script processes.
pub struct Supervisor {
    catalog: Arc<Catalog>,
    notifier: Arc<Notifier>,
    /// script_id -> pid of its live child. Presence in this table is the definition of
    /// "alive" used throughout the system (health checker, admission checks).
    children: Arc<Mutex<HashMap<i64, u32>>>,
}

impl Supervisor {
    pub fn new(catalog: Arc<Catalog>, notifier: Arc<Notifier>) -> Self {
        Self {
            catalog,
            notifier,
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` if the live children table currently holds an entry for this script.
    pub fn is_running(&self, script_id: i64) -> Result<bool, SupervisorError> {
        Ok(self.children.lock()?.contains_key(&script_id))
    }

    /// Dispatches a run onto its own thread and returns immediately. A script already
    /// present in the live children table is left untouched (§8 property 6).
    pub fn run(
        self: &Arc<Self>,
        script_id: i64,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), SupervisorError> {
        if self.is_running(script_id)? {
            debug!(script_id, "run requested but script is already running; no-op");
            if let Some(cb) = on_complete {
                cb(ScriptStatus::Running);
            }
            return Ok(());
        }

        let script = self.catalog.get_script(script_id)?;
        let sup = Arc::clone(self);
        thread::Builder::new()
            .name(format!("script-{script_id}"))
            .spawn(move || sup.run_blocking(script, on_complete))
            .map_err(|source| SupervisorError::SpawnFailed {
                name: format!("supervisor-thread-{script_id}"),
                source,
            })?;
        Ok(())
    }

    fn run_blocking(&self, script: Script, on_complete: Option<CompletionCallback>) {
        let is_daemon = script.cron.as_deref() == Some(crate::constants::DAEMON_CRON_SENTINEL);
        let started = Instant::now();

        let log_path = match logs::prepare_for_run(script.id) {
            Ok(path) => path,
            Err(err) => {
                warn!(script = %script.name, %err, "failed to prepare log file");
                self.finish(&script, is_daemon, None, started, ScriptStatus::Failed, on_complete);
                return;
            }
        };

        let _ = logs::append_marker(
            &log_path,
            &format!("==== Starting at {} ====", Utc::now().to_rfc3339()),
        );

        let (program, args) = match resolve_invocation(&script) {
            Ok(resolved) => resolved,
            Err(message) => {
                let _ = logs::append_marker(&log_path, &format!("Internal Error: {message}"));
                self.finish(&script, is_daemon, Some(&log_path), started, ScriptStatus::Failed, on_complete);
                return;
            }
        };

        let stdout_file = match logs::open_for_append(&log_path) {
            Ok(file) => file,
            Err(err) => {
                warn!(script = %script.name, %err, "failed to open log file for writing");
                self.finish(&script, is_daemon, Some(&log_path), started, ScriptStatus::Failed, on_complete);
                return;
            }
        };
        let stderr_file = match stdout_file.try_clone() {
            Ok(file) => file,
            Err(err) => {
                warn!(script = %script.name, %err, "failed to duplicate log handle");
                self.finish(&script, is_daemon, Some(&log_path), started, ScriptStatus::Failed, on_complete);
                return;
            }
        };

        let mut command = Command::new(&program);
        command.args(&args).stdin(Stdio::null()).stdout(stdout_file).stderr(stderr_file);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let _ = logs::append_marker(&log_path, &format!("Internal Error: failed to start process: {err}"));
                self.finish(&script, is_daemon, Some(&log_path), started, ScriptStatus::Failed, on_complete);
                return;
            }
        };

        let pid = child.id();
        if let Err(err) = self.catalog.mark_started(script.id) {
            warn!(script = %script.name, %err, "failed to persist run-start");
        }
        self.children.lock().expect("children mutex poisoned").insert(script.id, pid);
        info!(script = %script.name, pid, "script started");

        let exit_status = match child.wait() {
            Ok(status) => status,
            Err(err) => {
                warn!(script = %script.name, %err, "failed while waiting on child");
                self.children.lock().expect("children mutex poisoned").remove(&script.id);
                self.finish(&script, is_daemon, Some(&log_path), started, ScriptStatus::Failed, on_complete);
                return;
            }
        };

        self.children.lock().expect("children mutex poisoned").remove(&script.id);
        let status = classify_exit(exit_status);
        self.finish(&script, is_daemon, Some(&log_path), started, status, on_complete);
    }

    fn finish(
        &self,
        script: &Script,
        is_daemon: bool,
        log_path: Option<&std::path::Path>,
        started: Instant,
        status: ScriptStatus,
        on_complete: Option<CompletionCallback>,
    ) {
        if let Some(path) = log_path {
            let _ = logs::append_marker(
                path,
                &format!("==== Finished at {} with status: {status} ====", Utc::now().to_rfc3339()),
            );
        }

        let output_tail = log_path.map(|path| logs::read_tail(path, crate::constants::LAST_OUTPUT_MAX_CHARS)).unwrap_or_default();
        if let Err(err) = self.catalog.record_completion(script.id, status, &output_tail) {
            warn!(script = %script.name, %err, "failed to record run completion");
        }

        self.maybe_notify(script, is_daemon, status, started.elapsed());

        if let Some(cb) = on_complete {
            cb(status);
        }
    }

    fn maybe_notify(&self, script: &Script, is_daemon: bool, status: ScriptStatus, elapsed: Duration) {
        if is_daemon {
            return;
        }
        let notify_on_failure_only = self
            .catalog
            .setting_is_true("tg_notify_on_failure_only")
            .unwrap_or(false);
        if notify_on_failure_only && status == ScriptStatus::Success {
            return;
        }
        let text = format!(
            "\u{1F680} Script: {}\nStatus: {}\nElapsed: {:.1}s",
            script.name,
            status,
            elapsed.as_secs_f64()
        );
        self.notifier.notify_best_effort(&self.catalog, &text);
    }

    /// Sends SIGTERM to the script's process group, waits, then escalates to SIGKILL
    /// (§4.1 stop, §5). Returns `true` once the process is confirmed gone or was already
    /// gone; `stop` performs signal delivery only, the owning thread updates status.
    pub fn stop(&self, script_id: i64) -> Result<bool, SupervisorError> {
        let pid = match self.children.lock()?.get(&script_id).copied() {
            Some(pid) => pid,
            None => return Ok(true),
        };

        if !signal_group(pid, Signal::SIGTERM, script_id)? {
            return Ok(true);
        }
        if self.wait_until_gone(script_id, STOP_GRACE_PERIOD) {
            return Ok(true);
        }

        if !signal_group(pid, Signal::SIGKILL, script_id)? {
            return Ok(true);
        }
        Ok(self.wait_until_gone(script_id, STOP_KILL_WAIT))
    }

    fn wait_until_gone(&self, script_id: i64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let alive = self
                .children
                .lock()
                .map(|children| children.contains_key(&script_id))
                .unwrap_or(false);
            if !alive {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(50));
        }
    }
}

/// Sends `sig` to the process group led by `pid`. Returns `false` if the group was
/// already gone (treated as success per §4.1/§7), propagates any other errno.
fn signal_group(pid: u32, sig: Signal, script_id: i64) -> Result<bool, SupervisorError> {
    match signal::killpg(Pid::from_raw(pid as i32), sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(SupervisorError::SignalFailed {
            name: script_id.to_string(),
            source,
        }),
    }
}

fn classify_exit(status: ExitStatus) -> ScriptStatus {
    if status.success() {
        return ScriptStatus::Success;
    }
    #[cfg(unix)]
    if status.signal() == Some(15) {
        return ScriptStatus::Stopped;
    }
    ScriptStatus::Failed
}

fn resolve_invocation(script: &Script) -> Result<(String, Vec<String>), String> {
    if !std::path::Path::new(&script.path).is_file() {
        return Err(format!("script file not found: {}", script.path));
    }

    let extra_args = match &script.arguments {
        Some(raw) if !raw.trim().is_empty() => {
            shell_words::split(raw).map_err(|err| format!("failed to tokenize arguments: {err}"))?
        }
        _ => Vec::new(),
    };

    let (program, mut args) = match script.script_type {
        ScriptType::Interpreter => (
            DEFAULT_INTERPRETER.to_string(),
            vec![INTERPRETER_UNBUFFERED_FLAG.to_string(), script.path.clone()],
        ),
        ScriptType::Shell => (
            LINE_BUFFER_WRAPPER.to_string(),
            vec![
                LINE_BUFFER_STDOUT_FLAG.to_string(),
                LINE_BUFFER_STDERR_FLAG.to_string(),
                DEFAULT_SHELL.to_string(),
                script.path.clone(),
            ],
        ),
    };
    args.extend(extra_args);
    Ok((program, args))
}
