//! Search backends
//!
//! Every backend answers the same [`BackendQuery`] with a [`BackendResponse`];
//! failures are folded into the response status instead of being returned as
//! errors, so a caller always gets a value back.

mod elasticsearch;
mod graphql;

pub use elasticsearch::{ElasticsearchBackend, ESCAPED_CHARACTERS};
pub use graphql::GraphqlBackend;

use crate::search::analysis::QueryFilters;
use crate::search::error::{SearchError, SearchResult};
use crate::search::result::{BackendResponse, BackendStatus, BackendType};
use crate::search::scope::SearchScope;
use async_trait::async_trait;

/// One backend request
#[derive(Debug, Clone, PartialEq)]
pub struct BackendQuery {
    pub query: String,
    pub scope: SearchScope,
    /// Restrict to one bucket; `None` searches every bucket in the catalog
    pub bucket: Option<String>,
    /// Restrict package hits to one package name
    pub package: Option<String>,
    pub filters: QueryFilters,
    pub limit: usize,
}

impl BackendQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: SearchScope::Global,
            bucket: None,
            package: None,
            filters: QueryFilters::default(),
            limit: 50,
        }
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        self.bucket = (!bucket.trim().is_empty()).then_some(bucket);
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        self.package = (!package.trim().is_empty()).then(|| package.trim().to_string());
        self
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A search backend
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn backend_type(&self) -> BackendType;

    /// Probe availability, reporting why the backend cannot serve requests
    async fn probe(&self) -> SearchResult<()>;

    async fn health_check(&self) -> bool {
        self.probe().await.is_ok()
    }

    /// Execute a search; never fails, errors are reported through the status
    async fn search(&self, query: &BackendQuery) -> BackendResponse;

    /// Total number of matching documents
    async fn count(&self, query: &BackendQuery) -> SearchResult<u64>;
}

/// Backend status implied by an error
pub(crate) fn failure_status(err: &SearchError) -> BackendStatus {
    match err {
        SearchError::AuthenticationRequired(_) | SearchError::InvalidConfiguration(_) => {
            BackendStatus::Unavailable
        }
        SearchError::Timeout(_) => BackendStatus::Timeout,
        _ => BackendStatus::Error,
    }
}

/// Fold a search error into a failed response
pub(crate) fn failure_response(
    backend_type: BackendType,
    err: &SearchError,
    query_time_ms: u64,
) -> BackendResponse {
    let mut response =
        BackendResponse::failure(backend_type, failure_status(err), err.to_string(), query_time_ms);
    response.error_category = Some(err.category());
    response
}
