//! Per-script log files: append-only writes, size-based rotation, and tail streaming (§4.3).

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;

use crate::{
    constants::{LOG_ROTATION_THRESHOLD_BYTES, TAIL_WAIT_FOR_CREATION_POLLS},
    error::LogsError,
    runtime,
};

/// Returns the stable log file path for a script id.
pub fn log_path(script_id: i64) -> PathBuf {
    runtime::log_dir().join(format!("{script_id}.log"))
}

/// Ensures the log directory and the script's log file exist, rotating it first if it has
/// grown past the size threshold (§4.1, §8 property 5).
pub fn prepare_for_run(script_id: i64) -> Result<PathBuf, LogsError> {
    let dir = runtime::log_dir();
    fs::create_dir_all(&dir)?;
    let path = log_path(script_id);
    rotate_if_needed(&path)?;
    Ok(path)
}

fn rotate_if_needed(path: &Path) -> Result<(), LogsError> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(()),
    };
    if size <= LOG_ROTATION_THRESHOLD_BYTES {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    writeln!(file, "==== Log rotated at {} ====", Utc::now().to_rfc3339())?;
    Ok(())
}

/// Opens the log file in append mode, creating it and its parent directory if needed.
/// Returned handles are suitable to hand directly to `Command::stdout`/`stderr` so the
/// child's combined output lands in the file without an intermediate reader thread.
pub fn open_for_append(path: &Path) -> Result<File, LogsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Appends a standalone separator line, used for the start/finish markers (§4.1).
pub fn append_marker(path: &Path, text: &str) -> Result<(), LogsError> {
    let mut file = open_for_append(path)?;
    writeln!(file, "{text}")?;
    Ok(())
}

/// Reads the trailing `max_chars` characters of a script's log, used to populate
/// `last_output` on completion (§3.1, §8 property 4).
pub fn read_tail(path: &Path, max_chars: usize) -> String {
    let contents = fs::read_to_string(path).unwrap_or_default();
    let char_count = contents.chars().count();
    if char_count <= max_chars {
        return contents;
    }
    contents.chars().skip(char_count - max_chars).collect()
}

/// Incremental reader used to stream a log file to a subscriber (§4.3).
///
/// The first call to [`LogTailer::poll`] returns the file's full current contents (the
/// snapshot); every later call returns only bytes appended since the previous poll.
pub struct LogTailer {
    path: PathBuf,
    file: Option<File>,
    position: u64,
    waited_polls: usize,
}

impl LogTailer {
    /// Creates a tailer for the given script id. The log file need not exist yet.
    pub fn new(script_id: i64) -> Self {
        Self {
            path: log_path(script_id),
            file: None,
            position: 0,
            waited_polls: 0,
        }
    }

    fn ensure_open(&mut self) -> Result<bool, LogsError> {
        if self.file.is_some() {
            return Ok(true);
        }
        if !self.path.exists() {
            return Ok(false);
        }
        self.file = Some(File::open(&self.path)?);
        Ok(true)
    }

    /// Returns newly available log text, or `Ok(None)` while the file has no new content
    /// (including not existing yet). Absence past the creation-wait budget
    /// (`TAIL_WAIT_FOR_CREATION_POLLS` polls) does not close the connection; it only makes
    /// [`LogTailer::still_waiting_on_creation`] start reporting `true` so a caller can
    /// surface a "waiting for log file" message (§4.3).
    pub fn poll(&mut self) -> Result<Option<String>, LogsError> {
        if !self.ensure_open()? {
            self.waited_polls = self.waited_polls.saturating_add(1);
            return Ok(None);
        }

        let file = self.file.as_mut().expect("checked by ensure_open");
        file.seek(SeekFrom::Start(self.position))?;
        let mut buf = String::new();
        let read = file.read_to_string(&mut buf)?;
        self.position += read as u64;
        Ok(Some(buf))
    }

    /// True once the tailer has polled past the creation-wait budget without the log
    /// file appearing. Purely informational; `poll` keeps polling regardless (§4.3).
    pub fn still_waiting_on_creation(&self) -> bool {
        self.file.is_none() && self.waited_polls > TAIL_WAIT_FOR_CREATION_POLLS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::env_lock;
    use tempfile::tempdir;

    #[test]
    fn prepare_for_run_creates_directory() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        runtime::init_with_test_root(temp.path());

        let path = prepare_for_run(42).unwrap();
        assert_eq!(path, runtime::log_dir().join("42.log"));
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn rotation_truncates_oversized_file() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        runtime::init_with_test_root(temp.path());

        let path = prepare_for_run(1).unwrap();
        let big = vec![b'a'; (LOG_ROTATION_THRESHOLD_BYTES + 1) as usize];
        fs::write(&path, &big).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > LOG_ROTATION_THRESHOLD_BYTES);

        rotate_if_needed(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("==== Log rotated at"));
        assert!((contents.len() as u64) < LOG_ROTATION_THRESHOLD_BYTES);
    }

    #[test]
    fn tailer_returns_snapshot_then_appended_text() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        runtime::init_with_test_root(temp.path());

        let path = prepare_for_run(7).unwrap();
        fs::write(&path, "first line\n").unwrap();

        let mut tailer = LogTailer::new(7);
        let snapshot = tailer.poll().unwrap().unwrap();
        assert_eq!(snapshot, "first line\n");

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "second line").unwrap();

        let delta = tailer.poll().unwrap().unwrap();
        assert_eq!(delta, "second line\n");
    }

    #[test]
    fn tailer_keeps_polling_past_the_wait_budget_instead_of_erroring() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        runtime::init_with_test_root(temp.path());

        let mut tailer = LogTailer::new(999);
        for _ in 0..TAIL_WAIT_FOR_CREATION_POLLS {
            assert!(tailer.poll().unwrap().is_none());
            assert!(!tailer.still_waiting_on_creation());
        }
        assert!(tailer.poll().unwrap().is_none());
        assert!(tailer.still_waiting_on_creation());

        // The file can still show up later; absence never closes the connection.
        let path = prepare_for_run(999).unwrap();
        fs::write(&path, "finally here\n").unwrap();
        assert_eq!(tailer.poll().unwrap().unwrap(), "finally here\n");
    }

    #[test]
    fn read_tail_trims_to_max_chars() {
        let _guard = env_lock();
        let temp = tempdir().unwrap();
        runtime::init_with_test_root(temp.path());
        let path = temp.path().join("out.log");
        fs::write(&path, "x".repeat(100)).unwrap();

        let tail = read_tail(&path, 10);
        assert_eq!(tail.len(), 10);
    }
}
