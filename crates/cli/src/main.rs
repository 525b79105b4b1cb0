//! EHR console - query and report on hospital electronic health records

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "ehr-console")]
#[command(about = "Query and report on electronic health records")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Data directory for the session file and logs
    #[arg(short = 'd', long, global = true, env = "EHR_CONSOLE_STATE_DIR")]
    data_dir: Option<PathBuf>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "60")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    /// Session configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Override one configuration value, e.g. `--set max_replays=5`
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = config::resolve_data_dir(cli.data_dir);
    logging::init_logging(cli.log_level.into(), &data_dir, cli.no_file_log)?;

    let context = commands::Context::load(data_dir, cli.config.as_deref(), &cli.overrides)?;
    debug!(command = cli.command.name(), "Starting EHR console");

    if cli.timeout == 0 {
        if let Err(e) = cli.command.execute(context).await {
            error!("Command failed: {e:#}");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    } else {
        let timeout_duration = Duration::from_secs(cli.timeout);
        match tokio::time::timeout(timeout_duration, cli.command.execute(context)).await {
            Ok(Ok(())) => {
                debug!("Command completed successfully");
            }
            Ok(Err(e)) => {
                error!("Command failed: {e:#}");
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                eprintln!("Error: timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
