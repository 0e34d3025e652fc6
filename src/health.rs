//! Health checker: periodically cross-references daemon scripts marked `running` against
//! the supervisor's live-children table and repairs stale status (§4.4).

use std::sync::Arc;

use tracing::info;

use crate::{catalog::{Catalog, ScriptStatus}, error::{CatalogError, SupervisorError}, notifier::Notifier, supervisor::Supervisor};

/// One repaired daemon, reported back for testability (§4.4 point 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedDaemon {
    pub script_id: i64,
    pub name: String,
}

/// Error union for the health sweep.
#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Runs a single health-check sweep, repairing any daemon whose status says `running`
/// but which has no live child, and sending one batched notification if any were found.
pub fn run_sweep(
    catalog: &Arc<Catalog>,
    supervisor: &Arc<Supervisor>,
    notifier: &Arc<Notifier>,
) -> Result<Vec<RepairedDaemon>, HealthCheckError> {
    let candidates = catalog.running_daemons()?;
    let mut repaired = Vec::new();

    for script in candidates {
        if supervisor.is_running(script.id)? {
            continue;
        }
        catalog.record_completion(script.id, ScriptStatus::Failed, "")?;
        info!(script = %script.name, "daemon found stopped during health check; status repaired");
        repaired.push(RepairedDaemon {
            script_id: script.id,
            name: script.name,
        });
    }

    if !repaired.is_empty() {
        let lines = repaired
            .iter()
            .map(|daemon| format!("\u{1F534} Daemon [{}] stopped unexpectedly", daemon.name))
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!("\u{1F3E5} Health-check alert\n\n{lines}");
        notifier.notify_best_effort(catalog, &text);
    }

    Ok(repaired)
}
