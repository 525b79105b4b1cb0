//! Initialization functions for tracing

use anyhow::Result;
use std::fs::OpenOptions;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::tracing::config::InstrumentationConfig;

/// Initialize tracing with the given configuration
///
/// `RUST_LOG` takes precedence over `config.log_level`.
pub fn init_tracing(config: &InstrumentationConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(log_file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(service = %config.service_name, "tracing initialized");
    Ok(())
}

/// Initialize with default configuration from environment
pub fn init_default() -> Result<()> {
    init_tracing(&InstrumentationConfig::from_env())
}
