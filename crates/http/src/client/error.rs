//! Client error types

use crate::session::storage::StorageError;
use std::sync::Arc;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed (HTTP 401)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Token storage could not be read or written
    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),

    /// The call was waiting for a token refresh when the session was cleared
    #[error("Session was cleared before the request could be replayed")]
    SessionCleared,

    /// One replayed request answered several waiting callers
    #[error(transparent)]
    Shared(Arc<ClientError>),
}

/// How the session layer treats a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 401: recoverable through refresh and replay
    Unauthorized,
    /// No response at all: reported as lost connectivity
    Network,
    /// Anything else is left to the call site
    Other,
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    pub fn classify(&self) -> FailureKind {
        match self {
            Self::AuthenticationFailed(_) => FailureKind::Unauthorized,
            Self::Request(err)
                if err.status().is_none()
                    && (err.is_connect() || err.is_timeout() || err.is_request()) =>
            {
                FailureKind::Network
            }
            Self::Shared(inner) => inner.classify(),
            _ => FailureKind::Other,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.classify() == FailureKind::Unauthorized
    }

    pub fn is_network(&self) -> bool {
        self.classify() == FailureKind::Network
    }
}
