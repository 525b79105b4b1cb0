//! CLI configuration utilities

use anyhow::{Context, Result, anyhow};
use ehr_console_core::ValidateConfig;
use ehr_console_http::SessionConfig;
use std::path::{Path, PathBuf};

const SESSION_FILE_NAME: &str = "session.json";
const CONFIG_FILE_NAMES: [&str; 3] = ["config.toml", "config.yaml", "config.json"];

/// `--data-dir` / `EHR_CONSOLE_STATE_DIR`, else the platform data dir
pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ehr-console")
    })
}

/// File holding the stored tokens
pub fn session_file(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE_NAME)
}

/// An explicit `--config` file, else the first `config.*` in the data dir,
/// else defaults and environment only
pub fn load_session_config(data_dir: &Path, explicit: Option<&Path>) -> Result<SessionConfig> {
    let file = explicit.map(Path::to_path_buf).or_else(|| {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| data_dir.join(name))
            .find(|path| path.is_file())
    });

    match file {
        Some(path) => SessionConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => SessionConfig::from_env().context("Invalid EHR_CONSOLE_* environment configuration"),
    }
}

/// Apply `KEY=VALUE` overrides in order, validating after each one.
///
/// Values are read as JSON when they parse, otherwise as plain strings.
pub fn apply_overrides(config: SessionConfig, overrides: &[String]) -> Result<SessionConfig> {
    overrides.iter().try_fold(config, |config, entry| {
        let (key, raw) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Override '{entry}' is not KEY=VALUE"))?;
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        config
            .with_path_update(key.trim(), &value)
            .with_context(|| format!("Invalid override '{entry}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_file_lives_in_data_dir() {
        let dir = Path::new("/var/lib/ehr-console");
        assert_eq!(
            session_file(dir),
            PathBuf::from("/var/lib/ehr-console/session.json")
        );
    }

    #[test]
    fn test_config_discovered_in_data_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "records_url = \"http://his.local:9000\"\n",
        )
        .unwrap();

        let config = load_session_config(dir.path(), None).unwrap();
        assert_eq!(config.records_url, "http://his.local:9000");
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let config = apply_overrides(
            SessionConfig::default(),
            &[
                "max_replays=5".to_string(),
                "records_url=http://his.local:9000".to_string(),
                "max_replays=2".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(config.max_replays, 2);
        assert_eq!(config.records_url, "http://his.local:9000");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let defaults = SessionConfig::default();
        assert!(apply_overrides(defaults.clone(), &["max_replays=0".to_string()]).is_err());
        assert!(apply_overrides(defaults.clone(), &["max_replays".to_string()]).is_err());
        assert!(apply_overrides(defaults, &["unknown.key=1".to_string()]).is_err());
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(load_session_config(dir.path(), Some(&missing)).is_err());
    }
}
