//! Adapter interfaces for external systems.
//!
//! Adapters talk to remote services over a [`Transport`], a minimal blocking
//! JSON-over-HTTP seam. The production transport is reqwest; tests swap in
//! scripted fakes.

pub mod http;
pub mod pulp;

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

pub use http::ReqwestTransport;
pub use pulp::{PulpClient, PulpError, DOCKER_WEB_DISTRIBUTOR};

/// HTTP methods used by the adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Basic-auth credential pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// A fully-specified outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub credentials: Credentials,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: Method, url: String, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            body: None,
            credentials,
            timeout,
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Failures surfaced by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the same request may succeed if sent again.
    ///
    /// 4xx responses are excluded: resending cannot fix bad credentials or ids.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) | Self::Request(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Blocking JSON transport
pub trait Transport: Send + Sync {
    /// Send the request and return the decoded JSON body of a 2xx response
    fn send(&self, request: &HttpRequest) -> Result<Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Timeout("30s".into()).is_transient());
        assert!(TransportError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());

        assert!(!TransportError::Status {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_credentials_debug_masks_password() {
        let creds = Credentials::new("qa", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("qa"));
        assert!(!debug.contains("hunter2"));
    }
}
