//! Centralized constants for the script orchestrator.

use std::time::Duration;

/// Interpreter invoked for `type = interpreter` scripts, with an unbuffered-output flag
/// so the log sink observes output promptly (§4.1).
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const INTERPRETER_UNBUFFERED_FLAG: &str = "-u";

/// Shell used to run `type = shell` scripts.
pub const DEFAULT_SHELL: &str = "bash";

/// Wraps the shell invocation so its stdout/stderr are line-buffered instead of fully
/// buffered, matching the unbuffered-output guarantee interpreter scripts get from
/// `-u` (§4.1).
pub const LINE_BUFFER_WRAPPER: &str = "stdbuf";
pub const LINE_BUFFER_STDOUT_FLAG: &str = "-oL";
pub const LINE_BUFFER_STDERR_FLAG: &str = "-eL";

/// Sentinel cron value marking a script as a long-running daemon rather than a timed job.
pub const DAEMON_CRON_SENTINEL: &str = "@daemon";

/// Log file is rotated once it exceeds this size (§4.1, §8 property 5).
pub const LOG_ROTATION_THRESHOLD_BYTES: u64 = 2 * 1024 * 1024;

/// Trailing slice of a script's log kept on its record for quick display (§3.1, §8 property 4).
pub const LAST_OUTPUT_MAX_CHARS: usize = 5_000;

/// Grace period after SIGTERM before escalating to SIGKILL (§4.1 stop, §5).
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Wait window after SIGKILL before giving up on a clean reap.
pub const STOP_KILL_WAIT: Duration = Duration::from_secs(2);

/// Cadence of the scheduler's due-job sweep.
pub const SCHEDULER_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum number of past executions retained per job (§4.2-adjacent bookkeeping).
pub const MAX_EXECUTION_HISTORY: usize = 10;

/// Default health-check sweep cadence (§4.4), overridable via `HEALTH_CHECK_INTERVAL_SECS`.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Poll cadence for tail-streaming a log file (§4.3).
pub const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a tail subscriber waits for a not-yet-created log file before giving up
/// on the "file will appear soon" assumption (§4.3): 10 polls at `TAIL_POLL_INTERVAL`.
pub const TAIL_WAIT_FOR_CREATION_POLLS: usize = 10;
