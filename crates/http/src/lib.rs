//! EHR console HTTP layer
//!
//! A typed client for the authentication backend and the hospital records
//! service, and the session layer that keeps JWT credentials fresh: a 401 on
//! any call is intercepted, a single refresh is issued, and the failed work
//! is replayed once the new access token is stored.

pub mod client;
pub mod config;
pub mod session;
pub mod types;

pub use client::{ApiCall, ApiClient, CallKind, Service, error::ClientError};
pub use config::SessionConfig;
pub use types::{Credentials, TokenPair, User, UserCreateRequest};
pub use session::{
    LogoutReason, PendingFailures, SessionEvent, SessionManager,
    storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError},
    store::TokenStore,
};
