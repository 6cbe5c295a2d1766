//! reqwest-backed blocking transport.

use reqwest::blocking::Client;
use serde_json::Value;

use super::{HttpRequest, Method, Transport, TransportError};

/// Transport using `reqwest::blocking`
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<Value, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        let mut builder = builder
            .basic_auth(
                &request.credentials.username,
                Some(&request.credentials.password),
            )
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // A body cut short is a transport failure; only bad JSON is a decode error
        let body = response.bytes()?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() {
            Self::Request(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }
}
