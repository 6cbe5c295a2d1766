//! Pulp repository metadata client.
//!
//! Endpoints:
//! - POST /pulp/api/v2/repositories/search/ (content sets)
//! - GET  /pulp/api/v2/repositories/{id}/?distributors=true (docker name)
//!
//! Auth: HTTP basic. Every request is retried on transient failure according
//! to the client's [`RetryPolicy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use super::{Credentials, HttpRequest, Method, ReqwestTransport, Transport, TransportError};
use crate::core::retry::{Attempted, InvalidPolicy, RetryPolicy, Sleeper, ThreadSleeper};

/// Distributor type whose config names the public docker repository
pub const DOCKER_WEB_DISTRIBUTOR: &str = "docker_distributor_web";

const SEARCH_PATH: &str = "pulp/api/v2/repositories/search/";
const REGISTRY_ID_KEY: &str = "repo-registry-id";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by [`PulpClient`]
#[derive(Debug, Error)]
pub enum PulpError {
    #[error("Pulp request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Failed to set up HTTP client: {0}")]
    Client(#[source] TransportError),

    #[error("Unexpected response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Repository id must not be empty")]
    EmptyRepositoryId,

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(#[from] InvalidPolicy),
}

/// One entry of the search response
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: String,
    #[serde(default)]
    notes: Option<Notes>,
}

#[derive(Debug, Default, Deserialize)]
struct Notes {
    #[serde(default)]
    content_set: Option<String>,
}

/// Per-repository response (only the fields we read)
#[derive(Debug, Deserialize)]
struct RepositoryDetails {
    #[serde(default)]
    distributors: Vec<Distributor>,
}

#[derive(Debug, Deserialize)]
struct Distributor {
    distributor_type_id: String,
    #[serde(default)]
    config: Map<String, Value>,
}

/// Pulp API client
pub struct PulpClient {
    /// Server root, always ending in '/'
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl PulpClient {
    /// Create a client with the default timeout and retry policy
    pub fn new(server_url: &str, username: &str, password: &str) -> Result<Self, PulpError> {
        let transport = ReqwestTransport::new().map_err(PulpError::Client)?;

        Ok(Self {
            base_url: normalize_base_url(server_url),
            credentials: Credentials::new(username, password),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            transport: Arc::new(transport),
            sleeper: Arc::new(ThreadSleeper),
        })
    }

    /// Create from resolved settings
    pub fn from_settings(settings: &crate::config::PulpSettings) -> Result<Self, PulpError> {
        Self::new(&settings.server_url, &settings.username, &settings.password)?
            .with_timeout(settings.timeout())
            .with_retry_policy(settings.retry.clone())
    }

    /// Set the per-attempt request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the retry policy. Policies that never retry are rejected.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Result<Self, PulpError> {
        retry.validate()?;
        self.retry = retry;
        Ok(self)
    }

    /// Replace the HTTP transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the sleeper used between retries
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Resolve content sets for the given repository ids.
    ///
    /// The result follows the order of `repository_ids`. Repositories the
    /// server knows nothing about, or that have no content set, are skipped.
    #[instrument(skip(self, repository_ids), fields(count = repository_ids.len()))]
    pub fn get_content_sets<S: AsRef<str>>(
        &self,
        repository_ids: &[S],
    ) -> Result<Vec<String>, PulpError> {
        let ids: Vec<&str> = repository_ids.iter().map(AsRef::as_ref).collect();

        let request = self.request(Method::Post, SEARCH_PATH).with_body(json!({
            "criteria": {
                "filters": {
                    "id": {"$in": ids},
                },
                "fields": ["notes"],
            }
        }));

        let response = self.send(&request)?;
        let results: Vec<SearchResult> =
            serde_json::from_value(response).map_err(|e| PulpError::MalformedResponse {
                url: request.url.clone(),
                reason: format!("search results: {}", e),
            })?;

        let content_sets: HashMap<String, String> = results
            .into_iter()
            .filter_map(|repo| {
                let content_set = repo.notes.and_then(|n| n.content_set)?;
                Some((repo.id, content_set))
            })
            .collect();

        let resolved: Vec<String> = ids
            .iter()
            .filter_map(|id| content_sets.get(*id).cloned())
            .collect();

        debug!(
            requested = ids.len(),
            resolved = resolved.len(),
            "Resolved content sets"
        );
        Ok(resolved)
    }

    /// Resolve the docker registry name published for a repository
    #[instrument(skip(self))]
    pub fn get_docker_repository_name(&self, repository_id: &str) -> Result<String, PulpError> {
        if repository_id.is_empty() {
            return Err(PulpError::EmptyRepositoryId);
        }

        let path = format!("pulp/api/v2/repositories/{}/", repository_id);
        let request = self
            .request(Method::Get, &path)
            .with_query("distributors", "true");

        let response = self.send(&request)?;
        let malformed = |reason: String| PulpError::MalformedResponse {
            url: request.url.clone(),
            reason,
        };

        let details: RepositoryDetails = serde_json::from_value(response)
            .map_err(|e| malformed(format!("repository details: {}", e)))?;

        let distributor = details
            .distributors
            .iter()
            .find(|d| d.distributor_type_id == DOCKER_WEB_DISTRIBUTOR)
            .ok_or_else(|| {
                malformed(format!(
                    "repository '{}' has no {} distributor",
                    repository_id, DOCKER_WEB_DISTRIBUTOR
                ))
            })?;

        let name = distributor
            .config
            .get(REGISTRY_ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                malformed(format!(
                    "{} distributor of '{}' has no '{}'",
                    DOCKER_WEB_DISTRIBUTOR, repository_id, REGISTRY_ID_KEY
                ))
            })?;

        Ok(name.to_string())
    }

    fn request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(
            method,
            format!("{}{}", self.base_url, path),
            self.credentials.clone(),
            self.timeout,
        )
    }

    /// Send with retry; the request is reused unmodified on every attempt
    fn send(&self, request: &HttpRequest) -> Result<Value, PulpError> {
        debug!(method = %request.method, url = %request.url, "Sending Pulp request");

        self.retry
            .run(
                self.sleeper.as_ref(),
                TransportError::is_transient,
                |_| self.transport.send(request),
            )
            .map_err(|Attempted { attempts, error }| PulpError::Transport {
                url: request.url.clone(),
                attempts,
                source: error,
            })
    }
}

fn normalize_base_url(server_url: &str) -> String {
    if server_url.ends_with('/') {
        server_url.to_string()
    } else {
        format!("{}/", server_url)
    }
}
