//! Request and response bodies of the authentication backend

use serde::{Deserialize, Serialize};

/// Token issuance request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Token issuance response: a fresh access/refresh pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Token refresh response; the refresh token itself is not rotated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access: String,
}

/// Token verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub username: String,
    pub password: String,
}

/// Account as returned by registration and `users/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}
