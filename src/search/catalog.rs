//! Catalog collaborators consumed by the search backends
//!
//! The search core never talks to the network directly. It goes through a
//! [`SessionProvider`] (session state, registry URL, GraphQL) and a
//! [`SearchTransport`] (raw index queries). [`HttpCatalogClient`] implements
//! both over HTTP.

use crate::config::CatalogConfig;
use crate::error::{AppError, Result as AppResult};
use crate::search::error::SearchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Result type for collaborator calls
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Failures reported by catalog collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// No active session
    #[error("No active catalog session")]
    NotAuthenticated,

    /// Registry URL not configured
    #[error("Catalog registry URL is not configured")]
    MissingRegistryUrl,

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Error payload embedded in an otherwise successful response
    #[error("Backend error: {0}")]
    Backend(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Response body could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl CatalogError {
    /// True when the catalog refused the request for the current credentials
    pub fn is_authorization_failure(&self) -> bool {
        match self {
            CatalogError::Http { status, .. } => *status == StatusCode::FORBIDDEN.as_u16(),
            CatalogError::Backend(message) => {
                let lowered = message.to_ascii_lowercase();
                lowered.contains("403") || lowered.contains("forbidden")
            }
            _ => false,
        }
    }
}

impl From<CatalogError> for SearchError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotAuthenticated => SearchError::AuthenticationRequired(err.to_string()),
            CatalogError::MissingRegistryUrl => SearchError::InvalidConfiguration(err.to_string()),
            CatalogError::Http { status, .. } if status == StatusCode::UNAUTHORIZED.as_u16() => {
                SearchError::AuthenticationRequired(err.to_string())
            }
            ref e if e.is_authorization_failure() => SearchError::AuthorizationFailed(e.to_string()),
            CatalogError::Http { .. } | CatalogError::Backend(_) => {
                SearchError::SearchFailed(err.to_string())
            }
            CatalogError::Network(msg) => SearchError::Network(msg),
            CatalogError::Timeout(msg) => SearchError::Timeout(msg),
            CatalogError::MalformedResponse(msg) => SearchError::MalformedResponse(msg),
        }
    }
}

/// Session, registry and GraphQL access
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Whether an authenticated session exists
    fn is_authenticated(&self) -> bool;

    /// Registry (API) URL of the catalog
    fn registry_url(&self) -> Option<String>;

    /// Execute a GraphQL document and return its `data` member
    async fn graphql(&self, query: &str, variables: Value) -> CatalogResult<Value>;
}

/// Raw index query execution
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Run `query` against the comma-separated `index` pattern, returning the raw response
    async fn search(&self, query: &Value, index: &str, limit: usize) -> CatalogResult<Value>;
}

const BUCKET_CONFIGS_QUERY: &str = "query BucketConfigs { bucketConfigs { name } }";

/// Enumerate the names of every bucket configured in the catalog
pub async fn list_bucket_names(session: &dyn SessionProvider) -> CatalogResult<Vec<String>> {
    let data = session.graphql(BUCKET_CONFIGS_QUERY, json!({})).await?;
    let configs = data
        .get("bucketConfigs")
        .and_then(Value::as_array)
        .ok_or_else(|| CatalogError::MalformedResponse("missing bucketConfigs".to_string()))?;

    Ok(configs
        .iter()
        .filter_map(|config| config.get("name").and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

/// `s3://bucket/some/path/` -> `bucket`
pub fn normalize_bucket(bucket: &str) -> String {
    let trimmed = bucket.trim();
    let without_scheme = trimmed.strip_prefix("s3://").unwrap_or(trimmed);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Fail unless a session and registry URL are both present
pub(crate) fn require_session(session: &dyn SessionProvider) -> CatalogResult<String> {
    if !session.is_authenticated() {
        return Err(CatalogError::NotAuthenticated);
    }
    session.registry_url().ok_or(CatalogError::MissingRegistryUrl)
}

/// Treat an `error` member in a response body as a failure
pub(crate) fn reject_error_payload(body: Value) -> CatalogResult<Value> {
    match body.get("error") {
        Some(Value::Null) | None => Ok(body),
        Some(Value::String(message)) => Err(CatalogError::Backend(message.clone())),
        Some(other) => Err(CatalogError::Backend(other.to_string())),
    }
}

/// HTTP implementation of both collaborator traits
#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    registry_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: u64,
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("catalog-unified-search/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            registry_url: config
                .registry_url()
                .map(|url| url.trim_end_matches('/').to_string()),
            access_token: config.access_token().map(str::to_string),
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn endpoint(&self, path: &str) -> CatalogResult<String> {
        let base = self
            .registry_url
            .as_deref()
            .ok_or(CatalogError::MissingRegistryUrl)?;
        Ok(format!("{}{}", base, path))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> CatalogResult<reqwest::RequestBuilder> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(CatalogError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    fn map_request_error(&self, err: reqwest::Error) -> CatalogError {
        if err.is_timeout() {
            CatalogError::Timeout(format!(
                "catalog request timed out after {} seconds",
                self.timeout_secs
            ))
        } else {
            CatalogError::Network(err.to_string())
        }
    }

    async fn read_json(&self, response: reqwest::Response) -> CatalogResult<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Catalog request failed");
            return Err(CatalogError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| CatalogError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl SessionProvider for HttpCatalogClient {
    fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn registry_url(&self) -> Option<String> {
        self.registry_url.clone()
    }

    async fn graphql(&self, query: &str, variables: Value) -> CatalogResult<Value> {
        let url = self.endpoint("/graphql")?;
        let request = self
            .authorized(self.client.post(&url))?
            .json(&json!({ "query": query, "variables": variables }));

        let response = request.send().await.map_err(|e| self.map_request_error(e))?;
        let body = self.read_json(response).await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(CatalogError::Backend(messages));
            }
        }

        debug!(url = %url, "GraphQL request completed");
        body.get("data")
            .cloned()
            .ok_or_else(|| CatalogError::MalformedResponse("missing data".to_string()))
    }
}

#[async_trait]
impl SearchTransport for HttpCatalogClient {
    async fn search(&self, query: &Value, index: &str, limit: usize) -> CatalogResult<Value> {
        let url = self.endpoint("/api/search")?;
        let body = serde_json::to_string(query)
            .map_err(|e| CatalogError::MalformedResponse(e.to_string()))?;
        let size = limit.to_string();

        let request = self.authorized(self.client.get(&url))?.query(&[
            ("index", index),
            ("action", "search"),
            ("size", size.as_str()),
            ("body", body.as_str()),
        ]);

        let response = request.send().await.map_err(|e| self.map_request_error(e))?;
        reject_error_payload(self.read_json(response).await?)
    }
}
