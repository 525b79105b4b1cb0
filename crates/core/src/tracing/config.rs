//! Configuration for tracing and instrumentation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Service name attached to every event
    pub service_name: String,
    /// Log level filter (e.g., "info", "debug", "ehr_console_http=trace")
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write events to this file (ANSI colours disabled)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: "ehr-console".to_string(),
            log_level: "info".to_string(),
            json: false,
            log_file: None,
        }
    }
}

impl InstrumentationConfig {
    /// Create configuration from environment variables
    ///
    /// Supports the following environment variables:
    /// - `SERVICE_NAME`: Service name
    /// - `RUST_LOG`: Log level filter
    /// - `EHR_CONSOLE_LOG_FORMAT`: `json` for JSON output
    /// - `EHR_CONSOLE_LOG_FILE`: Path of an additional log file
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            json: std::env::var("EHR_CONSOLE_LOG_FORMAT")
                .is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            log_file: std::env::var_os("EHR_CONSOLE_LOG_FILE").map(PathBuf::from),
        }
    }

    /// Create a development configuration with verbose session logging
    pub fn dev() -> Self {
        Self {
            service_name: "ehr-console-dev".to_string(),
            log_level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Default filter directive for the given level across the workspace crates
    pub fn filter_for_level(level: &str) -> String {
        format!("ehr_console={level},ehr_console_core={level},ehr_console_http={level}")
    }
}
