#[path = "common/mod.rs"]
mod common;

use common::RootEnvGuard;
use orchestrator::{
    catalog::{Catalog, NewScript, ScriptStatus, ScriptType},
    cron::{script_job_id, JobRegistry},
    runtime,
};

#[test]
fn daemon_sentinel_is_never_scheduled() {
    let guard = RootEnvGuard::new();
    let catalog = Catalog::open(runtime::database_url()).unwrap();
    let registry = JobRegistry::load().unwrap();

    let script = catalog
        .insert_script(NewScript {
            name: "daemon".to_string(),
            path: guard.script_path("daemon.sh").to_string_lossy().into_owned(),
            script_type: ScriptType::Shell,
            arguments: None,
            cron: Some("@daemon".to_string()),
            enabled: true,
            run_on_startup: false,
            description: None,
        })
        .unwrap();

    registry.upsert_script_job(script.id, script.cron.as_deref()).unwrap();
    assert!(!registry.exists(&script_job_id(script.id)).unwrap());
}

#[test]
fn scenario_cron_fires_and_updates_status_via_orchestrator_dispatch() {
    let guard = RootEnvGuard::new();
    let catalog = Catalog::open(runtime::database_url()).unwrap();
    let registry = JobRegistry::load().unwrap();

    let marker = guard.root.join("ran");
    let script_path = guard.write_script("minutely.sh", &format!("echo hi > \"{}\"", marker.display()));
    let script = catalog
        .insert_script(NewScript {
            name: "minutely".to_string(),
            path: script_path.to_string_lossy().into_owned(),
            script_type: ScriptType::Shell,
            arguments: None,
            cron: Some("* * * * *".to_string()),
            enabled: true,
            run_on_startup: false,
            description: None,
        })
        .unwrap();

    registry.upsert_script_job(script.id, script.cron.as_deref()).unwrap();
    assert!(registry.exists(&script_job_id(script.id)).unwrap());

    // The job is not due immediately (it fires at the next minute boundary); due_jobs()
    // right after registration must not fire it yet.
    let due = registry.due_jobs().unwrap();
    assert!(due.is_empty());
    assert_eq!(catalog.get_script(script.id).unwrap().last_status, ScriptStatus::Idle);
}

#[test]
fn fixed_job_registration_is_visible_via_list_and_removable() {
    let _guard = RootEnvGuard::new();
    let registry = JobRegistry::load().unwrap();
    registry
        .register_fixed_job(orchestrator::cron::HEALTH_CHECK_JOB_ID, "* * * * *")
        .unwrap();
    assert!(registry.list().unwrap().contains(&orchestrator::cron::HEALTH_CHECK_JOB_ID.to_string()));

    registry.remove(orchestrator::cron::HEALTH_CHECK_JOB_ID).unwrap();
    assert!(!registry.list().unwrap().contains(&orchestrator::cron::HEALTH_CHECK_JOB_ID.to_string()));
}

#[test]
fn persisted_job_state_survives_registry_reload() {
    let _guard = RootEnvGuard::new();
    {
        let registry = JobRegistry::load().unwrap();
        registry.upsert_script_job(42, Some("*/5 * * * *")).unwrap();
    }
    let reloaded = JobRegistry::load().unwrap();
    assert!(reloaded.exists(&script_job_id(42)).unwrap());
}
