//! Session layer configuration

use config::ConfigError;
use ehr_console_core::ValidateConfig;
use ehr_console_core::validation::validators::{validate_not_empty, validate_range, validate_url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::{ApiClient, ClientError};

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "EHR_CONSOLE";

/// Where the backends live and how tokens are handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Authentication backend address, without the API path
    pub backend_address: String,
    /// Path prefix of the backend REST API
    pub api_path: String,
    /// Base URL of the hospital records service
    pub records_url: String,
    /// Scheme placed before the access token in `Authorization`
    pub authorization_scheme: String,
    /// Storage key of the access token
    pub access_token_key: String,
    /// Storage key of the refresh token
    pub refresh_token_key: String,
    pub request_timeout_secs: u64,
    /// A refresh slower than this counts as failed
    pub refresh_timeout_secs: u64,
    /// How many times one call may be replayed after a refresh
    pub max_replays: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_address: "http://127.0.0.1:8000".to_string(),
            api_path: "/api".to_string(),
            records_url: "http://127.0.0.1:8080".to_string(),
            authorization_scheme: "JWT".to_string(),
            access_token_key: "access".to_string(),
            refresh_token_key: "refresh".to_string(),
            request_timeout_secs: 30,
            refresh_timeout_secs: 15,
            max_replays: 3,
        }
    }
}

impl SessionConfig {
    /// Load from a file, with `EHR_CONSOLE_*` variables taking precedence
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults overridden by `EHR_CONSOLE_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("backend_address", defaults.backend_address)?
            .set_default("api_path", defaults.api_path)?
            .set_default("records_url", defaults.records_url)?
            .set_default("authorization_scheme", defaults.authorization_scheme)?
            .set_default("access_token_key", defaults.access_token_key)?
            .set_default("refresh_token_key", defaults.refresh_token_key)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("refresh_timeout_secs", defaults.refresh_timeout_secs)?
            .set_default("max_replays", defaults.max_replays)?
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    /// Base URL of the authentication backend API
    pub fn backend_url(&self) -> String {
        format!(
            "{}{}",
            self.backend_address.trim_end_matches('/'),
            self.api_path
        )
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// Client for the authentication backend
    pub fn backend_client(&self) -> Result<ApiClient, ClientError> {
        ApiClient::builder()
            .base_url(self.backend_url())
            .authorization_scheme(&self.authorization_scheme)
            .timeout(self.request_timeout())
            .build()
    }

    /// Client for the records service
    pub fn records_client(&self) -> Result<ApiClient, ClientError> {
        ApiClient::builder()
            .base_url(&self.records_url)
            .authorization_scheme(&self.authorization_scheme)
            .timeout(self.request_timeout())
            .build()
    }
}

impl ValidateConfig for SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.backend_url(), "backend_address")?;
        validate_url(&self.records_url, "records_url")?;
        validate_not_empty(&self.authorization_scheme, "authorization_scheme")?;
        validate_not_empty(&self.access_token_key, "access_token_key")?;
        validate_not_empty(&self.refresh_token_key, "refresh_token_key")?;
        if self.access_token_key == self.refresh_token_key {
            return Err(ConfigError::Message(
                "access_token_key and refresh_token_key must differ".to_string(),
            ));
        }
        if !self.api_path.is_empty() && !self.api_path.starts_with('/') {
            return Err(ConfigError::Message(
                "api_path: must start with '/'".to_string(),
            ));
        }
        validate_range(self.request_timeout_secs, 1, 3600, "request_timeout_secs")?;
        validate_range(self.refresh_timeout_secs, 1, 3600, "refresh_timeout_secs")?;
        validate_range(self.max_replays, 1, 100, "max_replays")
    }
}
