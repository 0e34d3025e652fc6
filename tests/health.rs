#[path = "common/mod.rs"]
mod common;

use std::{sync::Arc, time::Duration};

use common::{wait_until, RootEnvGuard};
use orchestrator::{
    catalog::{Catalog, NewScript, ScriptStatus, ScriptType},
    health,
    notifier::Notifier,
    runtime,
    supervisor::Supervisor,
};

#[test]
fn scenario_daemon_death_is_detected_and_repaired() {
    let guard = RootEnvGuard::new();
    let catalog = Arc::new(Catalog::open(runtime::database_url()).unwrap());
    let notifier = Arc::new(Notifier::new());
    let supervisor = Arc::new(Supervisor::new(Arc::clone(&catalog), Arc::clone(&notifier)));

    let script_path = guard.write_script("flaky_daemon.sh", "sleep 600");
    let script = catalog
        .insert_script(NewScript {
            name: "flaky_daemon".to_string(),
            path: script_path.to_string_lossy().into_owned(),
            script_type: ScriptType::Shell,
            arguments: None,
            cron: Some("@daemon".to_string()),
            enabled: true,
            run_on_startup: false,
            description: None,
        })
        .unwrap();

    // A daemon the catalog still believes is `running` (e.g. from before an orchestrator
    // restart) but with no entry in this process's live children table — standing in for
    // the process having been killed out from under a prior orchestrator instance.
    catalog.mark_started(script.id).unwrap();
    assert!(!supervisor.is_running(script.id).unwrap());

    let repaired = health::run_sweep(&catalog, &supervisor, &notifier).unwrap();
    assert_eq!(repaired.len(), 1);
    assert_eq!(repaired[0].name, "flaky_daemon");

    let updated = catalog.get_script(script.id).unwrap();
    assert_eq!(updated.last_status, ScriptStatus::Failed);
}

#[test]
fn scenario_live_daemon_is_not_flagged() {
    let guard = RootEnvGuard::new();
    let catalog = Arc::new(Catalog::open(runtime::database_url()).unwrap());
    let notifier = Arc::new(Notifier::new());
    let supervisor = Arc::new(Supervisor::new(Arc::clone(&catalog), Arc::clone(&notifier)));

    let script_path = guard.write_script("steady_daemon.sh", "sleep 600");
    let script = catalog
        .insert_script(NewScript {
            name: "steady_daemon".to_string(),
            path: script_path.to_string_lossy().into_owned(),
            script_type: ScriptType::Shell,
            arguments: None,
            cron: Some("@daemon".to_string()),
            enabled: true,
            run_on_startup: false,
            description: None,
        })
        .unwrap();

    supervisor.run(script.id, None).unwrap();
    assert!(wait_until(|| supervisor.is_running(script.id).unwrap(), Duration::from_secs(5)));

    let repaired = health::run_sweep(&catalog, &supervisor, &notifier).unwrap();
    assert!(repaired.is_empty());

    supervisor.stop(script.id).unwrap();
}
