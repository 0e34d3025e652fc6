#![allow(dead_code)]

use std::{
    env, fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use orchestrator::test_utils::env_lock;

/// Points `SCRIPT_ROOT`/`ORCHESTRATOR_DATA_DIR` at a fresh temp directory and
/// re-resolves `orchestrator::runtime` from it for the lifetime of the guard, restoring the
/// previous environment on drop. Mirrors the "isolated per-test root" pattern used by the
/// library's own unit tests, but goes through the public env-driven `runtime::init()` the
/// way a real invocation would.
pub struct RootEnvGuard {
    previous_script_root: Option<String>,
    previous_data_dir: Option<String>,
    previous_database_url: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
    pub root: PathBuf,
}

impl RootEnvGuard {
    pub fn new() -> Self {
        let lock = env_lock();
        let temp = tempfile::tempdir().expect("failed to create tempdir").into_path();
        fs::create_dir_all(temp.join("scripts")).expect("failed to create scripts dir");

        let previous_script_root = env::var("SCRIPT_ROOT").ok();
        let previous_data_dir = env::var("ORCHESTRATOR_DATA_DIR").ok();
        let previous_database_url = env::var("DATABASE_URL").ok();

        unsafe {
            env::set_var("SCRIPT_ROOT", temp.join("scripts"));
            env::set_var("ORCHESTRATOR_DATA_DIR", temp.join("data"));
            env::remove_var("DATABASE_URL");
        }
        orchestrator::runtime::init();

        Self {
            previous_script_root,
            previous_data_dir,
            previous_database_url,
            _lock: lock,
            root: temp,
        }
    }

    pub fn script_path(&self, file_name: &str) -> PathBuf {
        self.root.join("scripts").join(file_name)
    }

    pub fn write_script(&self, file_name: &str, body: &str) -> PathBuf {
        let path = self.script_path(file_name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
        path
    }
}

impl Drop for RootEnvGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.previous_script_root {
                Some(value) => env::set_var("SCRIPT_ROOT", value),
                None => env::remove_var("SCRIPT_ROOT"),
            }
            match &self.previous_data_dir {
                Some(value) => env::set_var("ORCHESTRATOR_DATA_DIR", value),
                None => env::remove_var("ORCHESTRATOR_DATA_DIR"),
            }
            match &self.previous_database_url {
                Some(value) => env::set_var("DATABASE_URL", value),
                None => env::remove_var("DATABASE_URL"),
            }
        }
        orchestrator::runtime::init();
        let _ = fs::remove_dir_all(&self.root);
    }
}

pub fn wait_for_file_contains(path: &Path, needle: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(contents) = fs::read_to_string(path)
            && contents.contains(needle)
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(100));
    }
}

pub fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(100));
    }
}
