//! Unified search entry point
//!
//! [`UnifiedSearch::search`] parses the query, resolves exactly one backend
//! through the [`BackendRegistry`], runs it, post-filters the hits and assembles
//! the response. It always returns a serializable [`SearchOutcome`]; failures the
//! caller can act on come back as an [`ErrorResponse`].

use crate::config::SearchSettings;
use crate::search::analysis::{QueryAnalysis, QueryFilters, QueryParser, QueryScope};
use crate::search::backends::{BackendQuery, ElasticsearchBackend, GraphqlBackend};
use crate::search::catalog::{SearchTransport, SessionProvider};
use crate::search::error::{ErrorCategory, ErrorDetails, ErrorFix, ErrorResponse, SearchError};
use crate::search::explain::{explain, QueryExplanation};
use crate::search::registry::{BackendHealth, BackendRegistry};
use crate::search::result::{
    coerce_size, extension_of, BackendResponse, BackendStatus, BackendType,
    CanonicalSearchResult, ResultType,
};
use crate::search::scope::SearchScope;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const AUTO_BACKEND: &str = "auto";
const DEFAULT_LIMIT: usize = 50;

/// Tokens that mean the query already filters by extension itself
const EXTENSION_OPERATORS: &[&str] = &["ext:", "*."];

/// One search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub explain_query: bool,
    #[serde(default)]
    pub count_only: bool,
}

fn default_scope() -> String {
    "global".to_string()
}

fn default_backend() -> String {
    AUTO_BACKEND.to_string()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: default_scope(),
            target: String::new(),
            backend: default_backend(),
            limit: DEFAULT_LIMIT,
            include_metadata: false,
            explain_query: false,
            count_only: false,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn with_explanation(mut self, explain: bool) -> Self {
        self.explain_query = explain;
        self
    }

    pub fn with_count_only(mut self, count_only: bool) -> Self {
        self.count_only = count_only;
        self
    }

    /// Backend named by the request; `Ok(None)` means automatic selection
    fn requested_backend(&self) -> Result<Option<BackendType>, SearchError> {
        let name = self.backend.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(AUTO_BACKEND) {
            return Ok(None);
        }
        BackendType::parse(name)
            .map(Some)
            .ok_or_else(|| SearchError::InvalidQuery(format!("unknown backend '{}'", name)))
    }
}

/// Timing and status of the backend that served the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatusEcho {
    pub status: BackendStatus,
    pub query_time_ms: u64,
    pub result_count: usize,
    pub error: Option<String>,
}

/// Backend context of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub backend: BackendType,
    /// Total reported by the backend before truncation and post-filtering
    pub total_hits: u64,
    pub available_backends: Vec<BackendType>,
    pub suggested_backends: Vec<BackendType>,
}

/// Fix-it fields attached to a response whose backend failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub error: String,
    pub error_category: ErrorCategory,
    pub details: ErrorDetails,
    pub fix: ErrorFix,
    pub alternatives: BTreeMap<String, String>,
}

impl From<ErrorResponse> for BackendFailure {
    fn from(response: ErrorResponse) -> Self {
        Self {
            error: response.error,
            error_category: response.error_category,
            details: response.details,
            fix: response.fix,
            alternatives: response.alternatives,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedSearchResponse {
    pub success: bool,
    pub query: String,
    pub scope: String,
    pub target: String,
    pub results: Vec<CanonicalSearchResult>,
    pub total_results: usize,
    pub query_time_ms: u64,
    pub backend_used: BackendType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<QueryAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<QueryExplanation>,
    pub backend_status: BackendStatusEcho,
    pub backend_info: BackendInfo,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub failure: Option<BackendFailure>,
}

/// Payload of a count-only request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountResponse {
    pub success: bool,
    pub query: String,
    pub scope: String,
    pub target: String,
    pub count: u64,
    pub backend_used: BackendType,
    pub query_time_ms: u64,
}

/// Whatever a search produced; serializes to the bare payload
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Success(Box<UnifiedSearchResponse>),
    Count(CountResponse),
    Failure(Box<ErrorResponse>),
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            SearchOutcome::Success(response) => response.success,
            SearchOutcome::Count(response) => response.success,
            SearchOutcome::Failure(_) => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "success": false, "error": e.to_string() })
        })
    }
}

/// Drop results the backend may not have filtered exactly
///
/// Extension filters apply to files only and are skipped when the raw query
/// already carries an extension operator. Size bounds apply to every result
/// with a known size.
pub fn post_filter(
    results: Vec<CanonicalSearchResult>,
    filters: &QueryFilters,
    raw_query: &str,
) -> Vec<CanonicalSearchResult> {
    let filter_extensions = !filters.file_extensions.is_empty()
        && !EXTENSION_OPERATORS.iter().any(|op| raw_query.contains(op));

    results
        .into_iter()
        .filter(|result| {
            if filter_extensions && result.result_type == ResultType::File {
                let extension = extension_of(&result.name)
                    .or_else(|| result.s3_uri.as_deref().and_then(extension_of))
                    .or_else(|| result.metadata_key().and_then(extension_of))
                    .or_else(|| result.extension.clone());
                match extension {
                    Some(ext) if filters.file_extensions.contains(&ext) => {}
                    _ => return false,
                }
            }

            let size = result
                .size
                .or_else(|| result.metadata.get("size").and_then(coerce_size));
            if let Some(size) = size {
                if filters.size_min.is_some_and(|min| size < min)
                    || filters.size_max.is_some_and(|max| size > max)
                {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Stable sort by descending score; equal scores keep backend order
fn sort_by_score(results: &mut [CanonicalSearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Orchestrates query analysis, backend selection and response assembly
pub struct UnifiedSearch {
    parser: QueryParser,
    registry: BackendRegistry,
    session: Arc<dyn SessionProvider>,
}

impl UnifiedSearch {
    pub fn new(session: Arc<dyn SessionProvider>, registry: BackendRegistry) -> Self {
        Self {
            parser: QueryParser::new(),
            registry,
            session,
        }
    }

    /// Full-text backend first, structured backend second
    pub fn from_clients(
        session: Arc<dyn SessionProvider>,
        transport: Arc<dyn SearchTransport>,
        settings: &SearchSettings,
    ) -> Self {
        let registry = BackendRegistry::new()
            .with_backend(Arc::new(ElasticsearchBackend::from_settings(
                session.clone(),
                transport,
                settings,
            )))
            .with_backend(Arc::new(GraphqlBackend::new(session.clone())));
        Self::new(session, registry)
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Health of every registered backend
    pub async fn status(&self) -> BTreeMap<String, BackendHealth> {
        self.registry.status_report().await
    }

    pub async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        let start = Instant::now();
        let catalog_url = self.session.registry_url();
        let analysis = self
            .parser
            .parse(&request.query, &request.scope, &request.target);

        let requested = match request.requested_backend() {
            Ok(requested) => requested,
            Err(err) => {
                return SearchOutcome::Failure(Box::new(ErrorResponse::from_error(&err, catalog_url)))
            }
        };

        let Some(backend) = self.registry.resolve(requested).await else {
            return SearchOutcome::Failure(Box::new(self.no_backend(catalog_url).await));
        };

        let query = Self::backend_query(request, &analysis);

        if request.count_only {
            return match backend.count(&query).await {
                Ok(count) => SearchOutcome::Count(CountResponse {
                    success: true,
                    query: request.query.clone(),
                    scope: request.scope.clone(),
                    target: request.target.clone(),
                    count,
                    backend_used: backend.backend_type(),
                    query_time_ms: start.elapsed().as_millis() as u64,
                }),
                Err(err) => {
                    warn!(backend = backend.backend_type().as_str(), error = %err, "Count failed");
                    SearchOutcome::Failure(Box::new(ErrorResponse::from_error(&err, catalog_url)))
                }
            };
        }

        let response = backend.search(&query).await;
        self.registry.record_response(&response);

        let available = self.available_types().await;
        let failure = Self::backend_failure(&response, catalog_url);
        let mut outcome = self.assemble(
            request,
            analysis,
            response,
            query.package.as_deref(),
            available,
            start,
        );
        outcome.failure = failure;
        SearchOutcome::Success(Box::new(outcome))
    }

    /// Authentication failure if any backend reports one, otherwise "no backend"
    async fn no_backend(&self, catalog_url: Option<String>) -> ErrorResponse {
        if self.registry.has_auth_failure().await {
            warn!("No backend available: authentication required");
            ErrorResponse::authentication_required(catalog_url)
        } else {
            let statuses = self.registry.statuses().await;
            warn!(backends = statuses.len(), "No backend available");
            ErrorResponse::no_backend_available(catalog_url, statuses)
        }
    }

    async fn available_types(&self) -> Vec<BackendType> {
        self.registry
            .available_backends()
            .await
            .iter()
            .map(|backend| backend.backend_type())
            .collect()
    }

    /// Fix-it payload for a response whose backend failed
    fn backend_failure(
        response: &BackendResponse,
        catalog_url: Option<String>,
    ) -> Option<BackendFailure> {
        if response.is_success() {
            return None;
        }
        let payload = ErrorResponse::backend_error(
            response.backend_type.as_str(),
            response.error_category.unwrap_or(ErrorCategory::BackendError),
            response.error_message.clone().unwrap_or_default(),
            catalog_url,
        );
        Some(payload.into())
    }

    fn backend_query(request: &SearchRequest, analysis: &QueryAnalysis) -> BackendQuery {
        let mut query = BackendQuery::new(request.query.clone())
            .with_scope(SearchScope::parse(&request.scope))
            .with_filters(analysis.filters.clone())
            .with_limit(request.limit);

        // Package targets narrow to one package; registry targets are informational
        match (analysis.scope, &analysis.target) {
            (_, None) | (QueryScope::Registry, _) => {}
            (QueryScope::Package, Some(package)) => query = query.with_package(package.clone()),
            (_, Some(bucket)) => query = query.with_bucket(bucket.clone()),
        }
        query
    }

    fn assemble(
        &self,
        request: &SearchRequest,
        analysis: QueryAnalysis,
        response: BackendResponse,
        package: Option<&str>,
        available: Vec<BackendType>,
        start: Instant,
    ) -> UnifiedSearchResponse {
        let explicit = request.requested_backend().ok().flatten().is_some();
        let backend_used = response.backend_type;
        let success = response.is_success();

        let mut results = response.results;
        sort_by_score(&mut results);
        results.truncate(request.limit);
        let mut results = post_filter(results, &analysis.filters, &request.query);
        if let Some(package) = package {
            results.retain(|r| r.result_type != ResultType::PackageEntry || r.name == package);
        }

        if !request.include_metadata {
            for result in &mut results {
                result.metadata.clear();
            }
        }

        let explanation = request
            .explain_query
            .then(|| explain(&analysis, Some(backend_used), explicit, &available));

        let query_time_ms = start.elapsed().as_millis() as u64;
        info!(
            backend = backend_used.as_str(),
            success,
            result_count = results.len(),
            query_time_ms,
            "Unified search completed"
        );

        UnifiedSearchResponse {
            success,
            query: request.query.clone(),
            scope: request.scope.clone(),
            target: request.target.clone(),
            total_results: results.len(),
            query_time_ms,
            backend_used,
            backend_status: BackendStatusEcho {
                status: response.status,
                query_time_ms: response.query_time_ms,
                result_count: results.len(),
                error: response.error_message,
            },
            backend_info: BackendInfo {
                backend: backend_used,
                total_hits: response.total,
                available_backends: available,
                suggested_backends: analysis.suggested_backends.clone(),
            },
            explanation,
            analysis: (request.include_metadata || request.explain_query).then_some(analysis),
            results,
            failure: None,
        }
    }
}
