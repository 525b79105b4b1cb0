//! Authentication status shared by the session layer and route guards

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived authentication status.
///
/// Never persisted. Every process start begins in [`AuthenticationStatus::Loading`]
/// until token presence has been checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationStatus {
    #[default]
    Loading,
    Authenticated,
    Unauthenticated,
}

impl AuthenticationStatus {
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }

    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading)
    }
}

impl fmt::Display for AuthenticationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Loading => "loading",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        };
        f.write_str(label)
    }
}
