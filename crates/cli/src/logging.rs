use anyhow::Result;
use ehr_console_core::tracing::{InstrumentationConfig, init_tracing};
use std::path::Path;
use tracing::Level;

const LOG_FILE_NAME: &str = "cli.log";

/// Initialize logging for the CLI
///
/// Events go to stderr and, unless `no_file_log` is set, to
/// `<data_dir>/cli.log`. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: Level, data_dir: &Path, no_file_log: bool) -> Result<()> {
    let level = log_level.as_str().to_lowercase();
    let env = InstrumentationConfig::from_env();

    let config = InstrumentationConfig {
        log_level: std::env::var("RUST_LOG")
            .unwrap_or_else(|_| InstrumentationConfig::filter_for_level(&level)),
        log_file: if no_file_log {
            None
        } else {
            Some(env.log_file.clone().unwrap_or_else(|| data_dir.join(LOG_FILE_NAME)))
        },
        ..env
    };

    init_tracing(&config)
}
