//! Command-line front-end standing in for the out-of-scope REST facade during manual
//! operation and testing (§10.5).
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// A wrapper around `tracing`'s `LevelFilter` that also accepts a bare numeric level
/// (0 = off .. 5 = trace), matching what operators commonly type.
#[derive(Debug, Clone, Copy)]
pub struct LogLevelArg(pub LevelFilter);

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(level) = value.parse::<u8>() {
            let filter = match level {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                other => return Err(format!("invalid numeric log level: {other}")),
            };
            return Ok(LogLevelArg(filter));
        }

        LevelFilter::from_str(value)
            .map(LogLevelArg)
            .map_err(|err| err.to_string())
    }
}

/// Script orchestrator: a self-hosted scheduler and process supervisor for scripts.
#[derive(Debug, Parser)]
#[command(name = "orchestrator", version, about)]
pub struct Cli {
    /// Log verbosity, either a named level (`info`, `debug`, ...) or a number 0-5.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: LogLevelArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run Bootstrap and the scheduler/health-check loop in the foreground.
    Serve,
    /// Launch one script immediately via the supervisor.
    Run {
        /// Script id or name.
        script: String,
    },
    /// Stop a running script (graceful SIGTERM, then SIGKILL after a grace period).
    Stop {
        /// Script id or name.
        script: String,
    },
    /// List every script record and its current status.
    List,
    /// Print a script's log, optionally following new output.
    Logs {
        /// Script id or name.
        script: String,
        /// Keep streaming new output instead of printing a single snapshot.
        #[arg(long)]
        follow: bool,
    },
    /// Scan `SCRIPT_ROOT` for files not yet present in the catalog.
    Scan,
}

/// Parses process arguments into a [`Cli`].
pub fn parse_args() -> Cli {
    Cli::parse()
}
