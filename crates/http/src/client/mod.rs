//! REST client for the authentication backend and the records service

pub mod auth;
pub mod call;
pub mod error;
pub mod records;

pub use call::{ApiCall, CallKind, QueryKey, Service};
pub use error::ClientError;

use reqwest::{Client, ClientBuilder, header};
use serde_json::Value;
use std::time::Duration;

/// Default `Authorization` header scheme expected by the backend
pub const DEFAULT_AUTHORIZATION_SCHEME: &str = "JWT";

const USER_AGENT: &str = concat!("ehr-console/", env!("CARGO_PKG_VERSION"));

/// Client bound to one base URL
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    authorization_scheme: String,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a request builder without authentication
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url)
    }

    /// Create a request builder carrying `access` in the `Authorization` header
    pub fn authorized_request(
        &self,
        method: reqwest::Method,
        path: &str,
        access: &str,
    ) -> reqwest::RequestBuilder {
        self.request(method, path).header(
            header::AUTHORIZATION,
            format!("{} {access}", self.authorization_scheme),
        )
    }

    /// Execute a request and handle common errors
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let value = self.execute_value(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Execute a request, returning the raw JSON body. An empty body is
    /// returned as `Value::Null`.
    pub async fn execute_value(&self, request: reqwest::RequestBuilder) -> Result<Value, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    /// Send an [`ApiCall`]. The access token is attached only when the call
    /// asks for authorization and a token is available.
    pub async fn send_call(&self, call: &ApiCall, access: Option<&str>) -> Result<Value, ClientError> {
        let mut request = match access.filter(|_| call.with_authorization) {
            Some(access) => self.authorized_request(call.method.clone(), &call.path, access),
            None => self.request(call.method.clone(), &call.path),
        };
        if !call.params.is_empty() {
            request = request.query(&call.params);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        self.execute_value(request).await
    }
}

/// Builder for ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    authorization_scheme: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the `Authorization` scheme (defaults to `JWT`)
    #[must_use]
    pub fn authorization_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.authorization_scheme = Some(scheme.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new()
            .user_agent(self.user_agent.unwrap_or_else(|| USER_AGENT.to_string()));
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(ApiClient {
            client: client_builder.build()?,
            base_url,
            authorization_scheme: self
                .authorization_scheme
                .unwrap_or_else(|| DEFAULT_AUTHORIZATION_SCHEME.to_string()),
        })
    }
}
