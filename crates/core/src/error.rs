//! Common error handling utilities and conventions

/// Standard result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Core error types that can be shared across crates
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid date '{value}': expected yyyy/MM/dd")]
    InvalidDate { value: String },

    #[error("Unknown patient type: {value}")]
    UnknownPatientType { value: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CoreError {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid date error
    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err.to_string())
    }
}
