use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use orchestrator::{
    bootstrap::Orchestrator,
    catalog::Script,
    cli::{self, Commands},
    constants::TAIL_POLL_INTERVAL,
    error::OrchestratorError,
    logs::LogTailer,
    runtime,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = cli::parse_args();
    init_tracing(cli.log_level.0);
    runtime::init();

    let result = match cli.command {
        Commands::Serve => run_serve(),
        Commands::Run { script } => run_once(&script),
        Commands::Stop { script } => stop_once(&script),
        Commands::List => list_scripts(),
        Commands::Logs { script, follow } => show_logs(&script, follow),
        Commands::Scan => scan(),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(level: tracing::level_filters::LevelFilter) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_script(orchestrator: &Orchestrator, query: &str) -> Result<Script, OrchestratorError> {
    if let Ok(id) = query.parse::<i64>() {
        return Ok(orchestrator.catalog.get_script(id)?);
    }
    Ok(orchestrator.catalog.get_script_by_name(query)?)
}

fn run_serve() -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::bootstrap()?;
    tracing::info!("orchestrator started");

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown_requested);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .expect("failed to register signal handler");

    orchestrator.run_scheduler_loop(|| shutdown_requested.load(Ordering::SeqCst))?;

    tracing::info!("shutdown requested, stopping live scripts");
    orchestrator.shutdown();
    Ok(())
}

fn run_once(query: &str) -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::bootstrap()?;
    let script = resolve_script(&orchestrator, query)?;
    orchestrator.supervisor.run(script.id, None)?;
    println!("started '{}' (id {})", script.name, script.id);
    Ok(())
}

fn stop_once(query: &str) -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::bootstrap()?;
    let script = resolve_script(&orchestrator, query)?;
    let stopped = orchestrator.supervisor.stop(script.id)?;
    if stopped {
        println!("stopped '{}'", script.name);
    } else {
        println!("'{}' did not stop within the grace period", script.name);
    }
    Ok(())
}

fn list_scripts() -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::bootstrap()?;
    for script in orchestrator.catalog.list_scripts()? {
        println!(
            "{:>4}  {:<24} {:<10} cron={:<16} {}",
            script.id,
            script.name,
            script.last_status,
            script.cron.as_deref().unwrap_or("-"),
            if script.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

fn show_logs(query: &str, follow: bool) -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::bootstrap()?;
    let script = resolve_script(&orchestrator, query)?;
    let mut tailer = LogTailer::new(script.id);

    loop {
        match tailer.poll() {
            Ok(Some(chunk)) => print!("{chunk}"),
            Ok(None) => {
                if tailer.still_waiting_on_creation() {
                    eprintln!("waiting for log file creation...");
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                break;
            }
        }
        if !follow {
            break;
        }
        std::thread::sleep(TAIL_POLL_INTERVAL);
    }
    Ok(())
}

fn scan() -> Result<(), OrchestratorError> {
    let orchestrator = Orchestrator::bootstrap()?;
    let inserted = orchestrator.sync_disk()?;
    println!("disk-sync inserted {inserted} new script(s)");
    Ok(())
}
