//! Bootstrap / lifecycle: startup reconciliation and shutdown teardown (§4.6).

use std::{path::Path, sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    catalog::{Catalog, NewScript, ScriptType},
    cron::{self, JobExecutionStatus, JobRegistry},
    error::OrchestratorError,
    health,
    notifier::Notifier,
    runtime,
    supervisor::Supervisor,
};

/// The fully wired set of long-lived components the `serve` command drives.
pub struct Orchestrator {
    pub catalog: Arc<Catalog>,
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<JobRegistry>,
    pub notifier: Arc<Notifier>,
}

impl Orchestrator {
    /// Performs the full startup sequence described in §4.6: open the catalog, start the
    /// job registry, register system jobs, reset stale statuses, sync the script
    /// directory from disk, register per-script cron jobs, and launch `run_on_startup`
    /// scripts.
    pub fn bootstrap() -> Result<Self, OrchestratorError> {
        let catalog = Arc::new(Catalog::open(runtime::database_url())?);
        let notifier = Arc::new(Notifier::new());
        let supervisor = Arc::new(Supervisor::new(Arc::clone(&catalog), Arc::clone(&notifier)));
        let registry = Arc::new(JobRegistry::load()?);

        let orchestrator = Self {
            catalog,
            supervisor,
            registry,
            notifier,
        };

        orchestrator.register_system_jobs()?;
        let reset = orchestrator.catalog.reset_stale_running()?;
        if reset > 0 {
            info!(count = reset, "reset stale 'running' statuses left over from a previous run");
        }
        orchestrator.sync_disk()?;
        orchestrator.register_script_jobs()?;
        orchestrator.launch_startup_scripts()?;

        Ok(orchestrator)
    }

    fn register_system_jobs(&self) -> Result<(), OrchestratorError> {
        if self.catalog.setting_is_true("enable_health_check")? {
            self.registry
                .register_fixed_job(cron::HEALTH_CHECK_JOB_ID, &runtime::health_check_cron_expression())?;
        } else {
            self.registry.remove(cron::HEALTH_CHECK_JOB_ID)?;
        }

        if self.catalog.setting_is_true("local_backup_enabled")? {
            if let Some(expr) = self.catalog.get_setting("local_backup_cron")? {
                self.registry.register_fixed_job(cron::LOCAL_BACKUP_JOB_ID, &expr)?;
            }
        } else {
            self.registry.remove(cron::LOCAL_BACKUP_JOB_ID)?;
        }

        if self.catalog.setting_is_true("cd2_backup_enabled")? {
            if let Some(expr) = self.catalog.get_setting("cd2_backup_cron")? {
                self.registry.register_fixed_job(cron::CD2_BACKUP_JOB_ID, &expr)?;
            }
        } else {
            self.registry.remove(cron::CD2_BACKUP_JOB_ID)?;
        }

        Ok(())
    }

    /// Inserts a disabled record for every recognized script file under `SCRIPT_ROOT`
    /// that is not yet known to the catalog (§4.6 point 7).
    pub fn sync_disk(&self) -> Result<usize, OrchestratorError> {
        let root = runtime::script_root();
        if !root.is_dir() {
            warn!(path = %root.display(), "script root does not exist; skipping disk sync");
            return Ok(0);
        }

        let known: std::collections::HashSet<String> = self.catalog.known_paths()?.into_iter().collect();
        let mut inserted = 0;

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(script_type) = infer_type(&path) else {
                continue;
            };
            let path_str = path.to_string_lossy().into_owned();
            if known.contains(&path_str) {
                continue;
            }
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_str.clone());

            self.catalog.insert_script(NewScript {
                name,
                path: path_str,
                script_type,
                arguments: None,
                cron: None,
                enabled: false,
                run_on_startup: false,
                description: None,
            })?;
            inserted += 1;
        }

        Ok(inserted)
    }

    fn register_script_jobs(&self) -> Result<(), OrchestratorError> {
        for script in self.catalog.list_scripts()? {
            if script.enabled {
                self.registry.upsert_script_job(script.id, script.cron.as_deref())?;
            }
        }
        Ok(())
    }

    fn launch_startup_scripts(&self) -> Result<(), OrchestratorError> {
        for script in self.catalog.list_scripts()? {
            if script.run_on_startup {
                self.supervisor.run(script.id, None)?;
            }
        }
        Ok(())
    }

    /// Runs the cron dispatch loop until `should_stop` returns true. Each due job is
    /// dispatched onto the supervisor; completion is reported back to the registry via a
    /// callback so job history stays accurate without the supervisor knowing about jobs.
    pub fn run_scheduler_loop(&self, should_stop: impl Fn() -> bool) -> Result<(), OrchestratorError> {
        while !should_stop() {
            for job_id in self.registry.due_jobs()? {
                self.dispatch_job(&job_id)?;
            }
            std::thread::sleep(crate::constants::SCHEDULER_TICK_INTERVAL);
        }
        Ok(())
    }

    fn dispatch_job(&self, job_id: &str) -> Result<(), OrchestratorError> {
        match job_id {
            cron::HEALTH_CHECK_JOB_ID => {
                let registry = Arc::clone(&self.registry);
                let job_id = job_id.to_string();
                let result = health::run_sweep(&self.catalog, &self.supervisor, &self.notifier);
                let status = match result {
                    Ok(_) => JobExecutionStatus::Success,
                    Err(err) => JobExecutionStatus::Failed(err.to_string()),
                };
                registry.mark_completed(&job_id, status)?;
            }
            cron::LOCAL_BACKUP_JOB_ID | cron::CD2_BACKUP_JOB_ID => {
                // Packaging itself is an external collaborator (§1); the core only
                // keeps the schedule and reports the tick as handled.
                self.registry.mark_completed(job_id, JobExecutionStatus::Success)?;
            }
            _ => {
                if let Some(script_id) = job_id.strip_prefix("script_").and_then(|rest| rest.parse::<i64>().ok()) {
                    let registry = Arc::clone(&self.registry);
                    let job_id = job_id.to_string();
                    self.supervisor.run(
                        script_id,
                        Some(Box::new(move |status| {
                            let exec_status = match status {
                                crate::catalog::ScriptStatus::Success => JobExecutionStatus::Success,
                                other => JobExecutionStatus::Failed(other.to_string()),
                            };
                            let _ = registry.mark_completed(&job_id, exec_status);
                        })),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Deletes a script record, stopping it first and removing its file and log so no
    /// orphaned process keeps writing into paths that are about to disappear (§9 open
    /// question, §3.3 lifecycle).
    pub fn delete_script(&self, script_id: i64) -> Result<(), OrchestratorError> {
        self.supervisor.stop(script_id)?;
        self.registry.remove(&cron::script_job_id(script_id))?;
        let script = self.catalog.delete_script(script_id)?;
        let _ = std::fs::remove_file(&script.path);
        let _ = std::fs::remove_file(crate::logs::log_path(script_id));
        Ok(())
    }

    /// Sends SIGTERM (via the supervisor's existing stop path) to every live child and
    /// cancels all jobs. Best-effort; used on `serve` shutdown.
    pub fn shutdown(&self) {
        if let Ok(scripts) = self.catalog.list_scripts() {
            for script in scripts {
                if self.supervisor.is_running(script.id).unwrap_or(false) {
                    let _ = self.supervisor.stop(script.id);
                }
            }
        }
    }
}

fn infer_type(path: &Path) -> Option<ScriptType> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("sh") | Some("bash") => Some(ScriptType::Shell),
        Some("py") => Some(ScriptType::Interpreter),
        _ => None,
    }
}

/// Wait helper shared by the CLI for commands that need the scheduler to have made
/// observable progress (kept for completeness; not on the `serve` hot path).
#[allow(dead_code)]
fn sleep_tick() {
    std::thread::sleep(Duration::from_millis(50));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::env_lock;
    use tempfile::tempdir;

    fn root_with_scripts_dir() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("scripts")).unwrap();
        temp
    }

    #[test]
    fn bootstrap_resets_stale_running_status() {
        let _guard = env_lock();
        let temp = root_with_scripts_dir();
        runtime::init_with_test_root(temp.path());

        {
            let catalog = Catalog::open(runtime::database_url()).unwrap();
            let script = catalog
                .insert_script(NewScript {
                    name: "stale".to_string(),
                    path: temp.path().join("scripts/stale.sh").to_string_lossy().into_owned(),
                    script_type: ScriptType::Shell,
                    arguments: None,
                    cron: Some(crate::constants::DAEMON_CRON_SENTINEL.to_string()),
                    enabled: false,
                    run_on_startup: false,
                    description: None,
                })
                .unwrap();
            catalog.mark_started(script.id).unwrap();
        }

        let orchestrator = Orchestrator::bootstrap().unwrap();
        let scripts = orchestrator.catalog.list_scripts().unwrap();
        assert_eq!(scripts[0].last_status, crate::catalog::ScriptStatus::Idle);
    }

    #[test]
    fn sync_disk_inserts_unknown_files_as_disabled() {
        let _guard = env_lock();
        let temp = root_with_scripts_dir();
        runtime::init_with_test_root(temp.path());
        std::fs::write(temp.path().join("scripts/found.sh"), "#!/bin/sh\necho hi\n").unwrap();

        let orchestrator = Orchestrator::bootstrap().unwrap();
        let scripts = orchestrator.catalog.list_scripts().unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name, "found");
        assert!(!scripts[0].enabled);
        assert!(!scripts[0].run_on_startup);
        assert_eq!(scripts[0].cron, None);
    }

    #[test]
    fn sync_disk_does_not_duplicate_known_paths() {
        let _guard = env_lock();
        let temp = root_with_scripts_dir();
        runtime::init_with_test_root(temp.path());
        std::fs::write(temp.path().join("scripts/found.sh"), "#!/bin/sh\necho hi\n").unwrap();

        let orchestrator = Orchestrator::bootstrap().unwrap();
        let inserted_again = orchestrator.sync_disk().unwrap();
        assert_eq!(inserted_again, 0);
        assert_eq!(orchestrator.catalog.list_scripts().unwrap().len(), 1);
    }

    #[test]
    fn delete_script_removes_file_log_and_job() {
        let _guard = env_lock();
        let temp = root_with_scripts_dir();
        runtime::init_with_test_root(temp.path());
        let script_path = temp.path().join("scripts/gone.sh");
        std::fs::write(&script_path, "#!/bin/sh\necho hi\n").unwrap();

        let orchestrator = Orchestrator::bootstrap().unwrap();
        let script = orchestrator.catalog.get_script_by_name("gone").unwrap();
        orchestrator
            .catalog
            .update_script(script.id, crate::catalog::ScriptUpdate {
                enabled: Some(true),
                cron: Some(Some("* * * * *".to_string())),
                ..Default::default()
            })
            .unwrap();
        orchestrator.registry.upsert_script_job(script.id, Some("* * * * *")).unwrap();

        orchestrator.delete_script(script.id).unwrap();

        assert!(!script_path.exists());
        assert!(orchestrator.catalog.get_script(script.id).is_err());
        assert!(!orchestrator.registry.exists(&cron::script_job_id(script.id)).unwrap());
    }
}
