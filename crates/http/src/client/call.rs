//! Replayable description of one API request

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use super::error::ClientError;

/// Compound key of a call; the first element is its identifier
pub type QueryKey = Vec<String>;

/// Which upstream a call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Authentication and account backend
    Backend,
    /// Hospital information system records service
    Records,
}

/// Reads are re-fetched after a refresh; writes are replayed with their
/// original input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Query,
    Mutation,
}

/// Everything needed to send, and later re-send, one request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub kind: CallKind,
    pub key: QueryKey,
    pub service: Service,
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Attach the stored access token
    pub with_authorization: bool,
}

impl ApiCall {
    /// A `GET` query. `key` must contain at least the identifier.
    pub fn query<I, S>(key: I, service: Service, path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(CallKind::Query, key, service, Method::GET, path)
    }

    pub fn mutation<I, S>(key: I, service: Service, method: Method, path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(CallKind::Mutation, key, service, method, path)
    }

    fn new<I, S>(kind: CallKind, key: I, service: Service, method: Method, path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            key: key.into_iter().map(Into::into).collect(),
            service,
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            with_authorization: false,
        }
    }

    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn authorized(mut self) -> Self {
        self.with_authorization = true;
        self
    }

    /// First element of the compound key
    pub fn identifier(&self) -> &str {
        self.key.first().map_or("", String::as_str)
    }

    /// Whether `identifier` appears anywhere in the compound key
    pub fn key_contains(&self, identifier: &str) -> bool {
        self.key.iter().any(|part| part == identifier)
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.method, self.path, self.key.join(","))
    }
}
