//! Authentication backend endpoints

use reqwest::Method;

use super::{ApiCall, ApiClient, ClientError, Service};
use crate::types::{AccessToken, Credentials, RefreshRequest, TokenPair, UserCreateRequest, VerifyRequest};

pub const JWT_CREATE_PATH: &str = "/auth/jwt/create";
pub const JWT_REFRESH_PATH: &str = "/auth/jwt/refresh";
pub const JWT_VERIFY_PATH: &str = "/auth/jwt/verify";
pub const USER_ME_PATH: &str = "/auth/users/me";
pub const USER_CREATE_PATH: &str = "/auth/users/";

pub const USER_ME_KEY: &str = "me";
pub const USER_CREATE_KEY: &str = "user_create";

impl ApiClient {
    /// Exchange credentials for an access/refresh pair
    pub async fn jwt_create(&self, credentials: &Credentials) -> Result<TokenPair, ClientError> {
        let req = self.request(Method::POST, JWT_CREATE_PATH).json(credentials);
        self.execute(req).await
    }

    /// Obtain a new access token; the refresh token is not rotated
    pub async fn jwt_refresh(&self, refresh: &str) -> Result<AccessToken, ClientError> {
        let req = self.request(Method::POST, JWT_REFRESH_PATH).json(&RefreshRequest {
            refresh: refresh.to_string(),
        });
        self.execute(req).await
    }

    /// Succeeds when the backend accepts `token`; the body carries nothing useful
    pub async fn jwt_verify(&self, token: &str) -> Result<(), ClientError> {
        let req = self.request(Method::POST, JWT_VERIFY_PATH).json(&VerifyRequest {
            token: token.to_string(),
        });
        self.execute_value(req).await.map(|_| ())
    }
}

/// The signed-in account
pub fn me() -> ApiCall {
    ApiCall::query([USER_ME_KEY], Service::Backend, USER_ME_PATH).authorized()
}

/// Account registration, replayed with the same payload after a refresh
pub fn user_create(payload: &UserCreateRequest) -> Result<ApiCall, ClientError> {
    ApiCall::mutation([USER_CREATE_KEY], Service::Backend, Method::POST, USER_CREATE_PATH).json(payload)
}
