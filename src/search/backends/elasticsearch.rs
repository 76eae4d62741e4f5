//! Full-text backend over per-bucket indices
//!
//! Queries are sent to a comma-separated index pattern built from the bucket
//! list. Catalogs with many buckets reject patterns that exceed their index
//! ceiling with a 403; in that case the search is retried against a shrinking,
//! prioritized prefix of the bucket list.

use crate::config::SearchSettings;
use crate::search::analysis::QueryFilters;
use crate::search::backends::{failure_response, BackendQuery, SearchBackend};
use crate::search::catalog::{
    list_bucket_names, normalize_bucket, reject_error_payload, require_session, CatalogError,
    CatalogResult, SearchTransport, SessionProvider,
};
use crate::search::error::{SearchError, SearchResult};
use crate::search::result::{BackendResponse, BackendType, CanonicalSearchResult};
use crate::search::scope::{
    PackageEntryScopeHandler, ScopeHandler, SearchScope, PACKAGES_SUFFIX,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters escaped in free-text queries; `*` and `?` stay live as wildcards
pub const ESCAPED_CHARACTERS: &[char] = &[
    '\\', '+', '-', '=', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', ':', '/',
];

const REINDEX_MARKER: &str = "-reindex-";

/// Full-text search backend
pub struct ElasticsearchBackend {
    session: Arc<dyn SessionProvider>,
    transport: Arc<dyn SearchTransport>,
    default_bucket: Option<String>,
    retry_steps: Vec<usize>,
    package_collapse: Option<String>,
}

impl ElasticsearchBackend {
    pub fn new(session: Arc<dyn SessionProvider>, transport: Arc<dyn SearchTransport>) -> Self {
        Self {
            session,
            transport,
            default_bucket: None,
            retry_steps: SearchSettings::default().bucket_retry_steps,
            package_collapse: None,
        }
    }

    /// Build from configuration
    pub fn from_settings(
        session: Arc<dyn SessionProvider>,
        transport: Arc<dyn SearchTransport>,
        settings: &SearchSettings,
    ) -> Self {
        Self::new(session, transport)
            .with_default_bucket(settings.default_bucket())
            .with_retry_steps(settings.bucket_retry_steps.clone())
            .with_package_collapse(settings.package_collapse_field())
    }

    /// Bucket moved to the front of every bucket list
    pub fn with_default_bucket(mut self, bucket: Option<String>) -> Self {
        self.default_bucket = bucket.map(|b| normalize_bucket(&b)).filter(|b| !b.is_empty());
        self
    }

    /// Bucket counts tried after an authorization failure, in order
    pub fn with_retry_steps(mut self, steps: Vec<usize>) -> Self {
        self.retry_steps = steps;
        self
    }

    /// Collapse package-scope hits sharing this field into one result
    pub fn with_package_collapse(mut self, field: Option<String>) -> Self {
        self.package_collapse = field.filter(|f| !f.trim().is_empty());
        self
    }

    /// Scope handler for `scope`; only the package scope collapses
    fn handler(&self, scope: SearchScope) -> Box<dyn ScopeHandler> {
        match (scope, &self.package_collapse) {
            (SearchScope::PackageEntry, Some(field)) => {
                Box::new(PackageEntryScopeHandler::default().with_collapse(field.clone()))
            }
            _ => scope.handler(),
        }
    }

    /// Escape query-syntax characters, leaving wildcards intact
    pub fn escape_query(query: &str) -> String {
        let mut escaped = String::with_capacity(query.len());
        for c in query.chars() {
            if ESCAPED_CHARACTERS.contains(&c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    /// Move `default_bucket` to the front if present; the rest keep their order
    pub fn prioritize_buckets(mut buckets: Vec<String>, default_bucket: Option<&str>) -> Vec<String> {
        if let Some(default_bucket) = default_bucket {
            if let Some(pos) = buckets.iter().position(|b| b == default_bucket) {
                let bucket = buckets.remove(pos);
                buckets.insert(0, bucket);
            }
        }
        buckets
    }

    /// Origin bucket of an index name: drops `_packages` and `-reindex-<token>`
    pub fn get_bucket_from_index(index: &str) -> String {
        let base = match index.find(REINDEX_MARKER) {
            Some(pos) => &index[..pos],
            None => index,
        };
        base.strip_suffix(PACKAGES_SUFFIX).unwrap_or(base).to_string()
    }

    /// Build the request body for `query` under `handler`'s scope
    pub fn build_search_body(
        query: &str,
        handler: &dyn ScopeHandler,
        filters: &QueryFilters,
        limit: usize,
    ) -> Value {
        let escaped = Self::escape_query(query.trim());
        let base = if escaped.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({
                "query_string": {
                    "query": escaped,
                    "analyze_wildcard": true,
                    "lenient": true
                }
            })
        };

        let (mut clause, collapse) = match handler.query_clause(&base) {
            Some(scoped) => (scoped.clause, scoped.collapse),
            None => (base, None),
        };

        let filter_clauses = Self::filter_clauses(filters);
        if !filter_clauses.is_empty() {
            clause = Self::merge_filters(clause, filter_clauses);
        }

        let mut body = json!({ "query": clause, "size": limit });
        if let Some(collapse) = collapse {
            body["collapse"] = collapse;
        }
        body
    }

    /// Append `filters` to a boolean clause, or wrap `clause` in a new one
    fn merge_filters(mut clause: Value, filters: Vec<Value>) -> Value {
        if !clause.get("bool").is_some_and(Value::is_object) {
            return json!({
                "bool": {
                    "must": [clause],
                    "filter": filters
                }
            });
        }

        if let Some(bool_clause) = clause.get_mut("bool").and_then(Value::as_object_mut) {
            let filter = bool_clause
                .entry("filter")
                .or_insert_with(|| Value::Array(Vec::new()));
            match filter {
                Value::Array(items) => items.extend(filters),
                other => {
                    let mut items = vec![other.take()];
                    items.extend(filters);
                    *other = Value::Array(items);
                }
            }
        }
        clause
    }

    /// Manifests and entries of one named package
    pub fn package_clause(package: &str) -> Value {
        json!({
            "bool": {
                "should": [
                    { "term": { "ptr_name": package } },
                    { "term": { "mnfst_name": package } },
                    { "prefix": { "entry_pk": format!("{}@", package) } }
                ],
                "minimum_should_match": 1
            }
        })
    }

    /// Restrict an already built body to one package
    pub fn restrict_to_package(body: &mut Value, package: &str) {
        let clause = body["query"].take();
        body["query"] = Self::merge_filters(clause, vec![Self::package_clause(package)]);
    }

    /// Filter clauses; documents lacking the filtered field pass through
    fn filter_clauses(filters: &QueryFilters) -> Vec<Value> {
        let mut clauses = Vec::new();

        if !filters.file_extensions.is_empty() {
            let mut extensions = Vec::with_capacity(filters.file_extensions.len() * 2);
            for ext in &filters.file_extensions {
                let bare = ext.trim_start_matches('.').to_ascii_lowercase();
                extensions.push(format!(".{}", bare));
                extensions.push(bare);
            }
            clauses.push(Self::unless_missing("ext", json!({ "terms": { "ext": extensions } })));
        }

        if filters.size_min.is_some() || filters.size_max.is_some() {
            let mut range = Map::new();
            if let Some(min) = filters.size_min {
                range.insert("gte".to_string(), json!(min));
            }
            if let Some(max) = filters.size_max {
                range.insert("lte".to_string(), json!(max));
            }
            clauses.push(Self::unless_missing("size", json!({ "range": { "size": range } })));
        }

        if filters.created_after.is_some() || filters.created_before.is_some() {
            let mut range = Map::new();
            if let Some(after) = &filters.created_after {
                range.insert("gte".to_string(), json!(after));
            }
            if let Some(before) = &filters.created_before {
                range.insert("lte".to_string(), json!(before));
            }
            clauses.push(Self::unless_missing(
                "last_modified",
                json!({ "range": { "last_modified": range } }),
            ));
        }

        clauses
    }

    fn unless_missing(field: &str, clause: Value) -> Value {
        json!({
            "bool": {
                "should": [
                    clause,
                    { "bool": { "must_not": { "exists": { "field": field } } } }
                ],
                "minimum_should_match": 1
            }
        })
    }

    /// Explicit bucket, or every catalog bucket with the default bucket first
    async fn resolve_buckets(&self, bucket: Option<&str>) -> SearchResult<(Vec<String>, bool)> {
        if let Some(bucket) = bucket {
            let normalized = normalize_bucket(bucket);
            if !normalized.is_empty() {
                return Ok((vec![normalized], true));
            }
        }

        let buckets = list_bucket_names(self.session.as_ref()).await?;
        let buckets = Self::prioritize_buckets(buckets, self.default_bucket.as_deref());
        debug!(bucket_count = buckets.len(), "Resolved catalog buckets");
        Ok((buckets, false))
    }

    async fn send(&self, body: &Value, index_pattern: &str, limit: usize) -> CatalogResult<Value> {
        let response = self.transport.search(body, index_pattern, limit).await?;
        reject_error_payload(response)
    }

    /// Run the query, shrinking the bucket set after an authorization failure
    async fn execute(
        &self,
        body: &Value,
        handler: &dyn ScopeHandler,
        buckets: &[String],
        explicit_bucket: bool,
        limit: usize,
    ) -> SearchResult<Value> {
        let index_pattern = handler.build_index_pattern(buckets)?;

        let original = match self.send(body, &index_pattern, limit).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if !(original.is_authorization_failure() && buckets.len() > 1 && !explicit_bucket) {
            return Err(original.into());
        }

        warn!(
            bucket_count = buckets.len(),
            error = %original,
            "Index pattern rejected, retrying with fewer buckets"
        );

        for &step in &self.retry_steps {
            if step == 0 || step >= buckets.len() {
                continue;
            }

            let subset_pattern = handler.build_index_pattern(&buckets[..step])?;
            match self.send(body, &subset_pattern, limit).await {
                Ok(response) => {
                    info!(
                        bucket_count = step,
                        total_buckets = buckets.len(),
                        "Search succeeded with reduced bucket set"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    debug!(bucket_count = step, error = %err, "Reduced bucket set also failed");
                }
            }
        }

        Err(SearchError::from(original))
    }

    /// Normalize raw hits through the scope handler, dropping invalid ones
    fn normalize_hits(response: &Value, handler: &dyn ScopeHandler) -> Vec<CanonicalSearchResult> {
        let hits = response
            .get("hits")
            .and_then(|hits| hits.get("hits"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let results: Vec<CanonicalSearchResult> = hits
            .iter()
            .filter_map(|hit| {
                let index = hit.get("_index").and_then(Value::as_str).unwrap_or("");
                let bucket = Self::get_bucket_from_index(index);
                handler.parse_result(hit, &bucket)
            })
            .collect();

        if results.len() < hits.len() {
            debug!(
                dropped = hits.len() - results.len(),
                "Dropped hits that failed validation"
            );
        }
        results
    }

    /// `hits.total` in either the integer or the `{ "value": n }` form
    fn total_hits(response: &Value, fallback: usize) -> u64 {
        match response.get("hits").and_then(|hits| hits.get("total")) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(fallback as u64),
            Some(Value::Object(total)) => total
                .get("value")
                .and_then(Value::as_u64)
                .unwrap_or(fallback as u64),
            _ => fallback as u64,
        }
    }

    async fn run(&self, query: &BackendQuery, limit: usize) -> SearchResult<(Value, Box<dyn ScopeHandler>)> {
        require_session(self.session.as_ref()).map_err(SearchError::from)?;

        let (buckets, explicit) = self.resolve_buckets(query.bucket.as_deref()).await?;
        if buckets.is_empty() {
            return Err(SearchError::from(CatalogError::Backend(
                "catalog has no buckets to search".to_string(),
            )));
        }

        let handler = self.handler(query.scope);
        let mut body =
            Self::build_search_body(&query.query, handler.as_ref(), &query.filters, limit);
        if let Some(package) = query.package.as_deref() {
            Self::restrict_to_package(&mut body, package);
        }
        let response = self
            .execute(&body, handler.as_ref(), &buckets, explicit, limit)
            .await?;
        Ok((response, handler))
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Elasticsearch
    }

    async fn probe(&self) -> SearchResult<()> {
        require_session(self.session.as_ref())?;
        Ok(())
    }

    async fn search(&self, query: &BackendQuery) -> BackendResponse {
        let start = Instant::now();

        match self.run(query, query.limit).await {
            Ok((response, handler)) => {
                let results = Self::normalize_hits(&response, handler.as_ref());
                let total = Self::total_hits(&response, results.len());
                let query_time_ms = start.elapsed().as_millis() as u64;

                info!(
                    backend = "elasticsearch",
                    scope = query.scope.as_str(),
                    result_count = results.len(),
                    total,
                    query_time_ms,
                    "Search completed"
                );
                BackendResponse::success(BackendType::Elasticsearch, results, total, query_time_ms)
            }
            Err(err) => {
                let query_time_ms = start.elapsed().as_millis() as u64;
                warn!(backend = "elasticsearch", error = %err, "Search failed");
                failure_response(BackendType::Elasticsearch, &err, query_time_ms)
            }
        }
    }

    async fn count(&self, query: &BackendQuery) -> SearchResult<u64> {
        let (response, _) = self.run(query, 0).await?;
        Ok(Self::total_hits(&response, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::result::BackendStatus;
    use crate::search::scope::{FileScopeHandler, GlobalScopeHandler};

    #[test]
    fn test_escape_keeps_wildcards() {
        let escaped = ElasticsearchBackend::escape_query("data*.csv?");
        assert_eq!(escaped, "data*.csv?");

        let escaped = ElasticsearchBackend::escape_query("a+b-c=d>e<f!g(h)i{j}k[l]m^n\"o~p:q/r\\s");
        assert_eq!(
            escaped,
            "a\\+b\\-c\\=d\\>e\\<f\\!g\\(h\\)i\\{j\\}k\\[l\\]m\\^n\\\"o\\~p\\:q\\/r\\\\s"
        );
    }

    #[test]
    fn test_escape_every_special_once() {
        for c in ESCAPED_CHARACTERS {
            let escaped = ElasticsearchBackend::escape_query(&c.to_string());
            assert_eq!(escaped, format!("\\{}", c));
        }
    }

    #[test]
    fn test_escaping_twice_double_escapes() {
        let once = ElasticsearchBackend::escape_query("a:b");
        let twice = ElasticsearchBackend::escape_query(&once);
        assert_eq!(once, "a\\:b");
        assert_eq!(twice, "a\\\\\\:b");
        assert_ne!(once, twice);
    }

    #[test]
    fn test_prioritize_buckets() {
        let buckets = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            ElasticsearchBackend::prioritize_buckets(buckets.clone(), Some("c")),
            vec!["c", "a", "b"]
        );
        assert_eq!(
            ElasticsearchBackend::prioritize_buckets(buckets.clone(), Some("zzz")),
            vec!["a", "b", "c"]
        );
        assert_eq!(ElasticsearchBackend::prioritize_buckets(buckets, None), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_get_bucket_from_index() {
        assert_eq!(
            ElasticsearchBackend::get_bucket_from_index("mybucket_packages-reindex-v123"),
            "mybucket"
        );
        assert_eq!(ElasticsearchBackend::get_bucket_from_index("mybucket"), "mybucket");
        assert_eq!(ElasticsearchBackend::get_bucket_from_index("mybucket_packages"), "mybucket");
        assert_eq!(ElasticsearchBackend::get_bucket_from_index("mybucket-reindex-abc"), "mybucket");
    }

    #[test]
    fn test_body_without_filters() {
        let body = ElasticsearchBackend::build_search_body(
            "reads*",
            &FileScopeHandler,
            &QueryFilters::default(),
            10,
        );
        assert_eq!(body["size"], 10);
        assert_eq!(body["query"]["query_string"]["query"], "reads*");
        assert!(body.get("collapse").is_none());
    }

    #[test]
    fn test_filters_wrap_plain_clause() {
        let filters = QueryFilters {
            file_extensions: vec!["csv".to_string()],
            size_min: Some(100),
            ..Default::default()
        };
        let body = ElasticsearchBackend::build_search_body("reads", &FileScopeHandler, &filters, 10);

        let bool_clause = &body["query"]["bool"];
        assert_eq!(bool_clause["must"][0]["query_string"]["query"], "reads");
        let filter = bool_clause["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(
            filter[0]["bool"]["should"][0]["terms"]["ext"],
            json!([".csv", "csv"])
        );
        assert_eq!(filter[1]["bool"]["should"][0]["range"]["size"]["gte"], 100);
    }

    #[test]
    fn test_filters_append_to_scope_clause() {
        let filters = QueryFilters {
            created_after: Some("now-7d".to_string()),
            ..Default::default()
        };
        let handler = PackageEntryScopeHandler::default().with_collapse("ptr_name");
        let body = ElasticsearchBackend::build_search_body("rnaseq", &handler, &filters, 5);

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 1);
        assert_eq!(
            filter[0]["bool"]["should"][0]["range"]["last_modified"]["gte"],
            "now-7d"
        );
        assert_eq!(body["query"]["bool"]["must"][0]["query_string"]["query"], "rnaseq");
        assert_eq!(body["collapse"]["field"], "ptr_name");
    }

    #[test]
    fn test_empty_query_matches_all() {
        let body = ElasticsearchBackend::build_search_body(
            "  ",
            &GlobalScopeHandler::default(),
            &QueryFilters::default(),
            1,
        );
        assert!(body["query"].get("match_all").is_some());
    }

    #[test]
    fn test_total_hits_forms() {
        assert_eq!(
            ElasticsearchBackend::total_hits(&json!({ "hits": { "total": { "value": 7 } } }), 0),
            7
        );
        assert_eq!(ElasticsearchBackend::total_hits(&json!({ "hits": { "total": 3 } }), 0), 3);
        assert_eq!(ElasticsearchBackend::total_hits(&json!({ "hits": {} }), 2), 2);
    }

    #[test]
    fn test_normalize_hits_drops_invalid() {
        let response = json!({
            "hits": {
                "hits": [
                    { "_index": "bkt_packages", "_source": { "ptr_name": "a/b" } },
                    { "_index": "bkt_packages", "_source": { "entry_size": 5 } },
                    { "_index": "bkt", "_source": { "key": "x.csv" } }
                ]
            }
        });
        let results =
            ElasticsearchBackend::normalize_hits(&response, &GlobalScopeHandler::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].bucket.as_deref(), Some("bkt"));
        assert_eq!(results[1].s3_uri.as_deref(), Some("s3://bkt/x.csv"));
    }

    struct FakeSession {
        authenticated: bool,
        buckets: Vec<String>,
    }

    #[async_trait]
    impl SessionProvider for FakeSession {
        fn is_authenticated(&self) -> bool {
            self.authenticated
        }

        fn registry_url(&self) -> Option<String> {
            Some("https://registry.example.com".to_string())
        }

        async fn graphql(&self, _query: &str, _variables: Value) -> CatalogResult<Value> {
            let configs: Vec<Value> = self.buckets.iter().map(|b| json!({ "name": b })).collect();
            Ok(json!({ "bucketConfigs": configs }))
        }
    }

    /// Rejects any index pattern naming more than `max_buckets` buckets
    struct CappedTransport {
        max_buckets: usize,
        calls: parking_lot::Mutex<Vec<String>>,
        bodies: parking_lot::Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl SearchTransport for CappedTransport {
        async fn search(&self, query: &Value, index: &str, _limit: usize) -> CatalogResult<Value> {
            self.calls.lock().push(index.to_string());
            self.bodies.lock().push(query.clone());
            let bucket_count = index.split(',').filter(|i| !i.ends_with(PACKAGES_SUFFIX)).count();
            if bucket_count > self.max_buckets {
                return Err(CatalogError::Http {
                    status: 403,
                    message: "Forbidden".to_string(),
                });
            }
            Ok(json!({
                "hits": {
                    "total": { "value": 1 },
                    "hits": [{ "_index": "bucket-0", "_score": 1.0, "_source": { "key": "a.csv" } }]
                }
            }))
        }
    }

    fn backend(buckets: usize, max_buckets: usize) -> (ElasticsearchBackend, Arc<CappedTransport>) {
        let session = Arc::new(FakeSession {
            authenticated: true,
            buckets: (0..buckets).map(|i| format!("bucket-{}", i)).collect(),
        });
        let transport = Arc::new(CappedTransport {
            max_buckets,
            calls: parking_lot::Mutex::new(Vec::new()),
            bodies: parking_lot::Mutex::new(Vec::new()),
        });
        (ElasticsearchBackend::new(session, transport.clone()), transport)
    }

    fn bucket_counts(transport: &CappedTransport) -> Vec<usize> {
        transport
            .calls
            .lock()
            .iter()
            .map(|index| index.split(',').filter(|i| !i.ends_with(PACKAGES_SUFFIX)).count())
            .collect()
    }

    #[test]
    fn test_package_restriction_wraps_plain_clause() {
        let mut body = ElasticsearchBackend::build_search_body(
            "reads",
            &FileScopeHandler,
            &QueryFilters::default(),
            10,
        );
        ElasticsearchBackend::restrict_to_package(&mut body, "team/pkg");

        assert_eq!(body["query"]["bool"]["must"][0]["query_string"]["query"], "reads");
        let should = &body["query"]["bool"]["filter"][0]["bool"]["should"];
        assert_eq!(should[0], json!({ "term": { "ptr_name": "team/pkg" } }));
        assert_eq!(should[2], json!({ "prefix": { "entry_pk": "team/pkg@" } }));
    }

    #[tokio::test]
    async fn test_package_target_reaches_query_body() {
        let (backend, transport) = backend(2, 10);
        backend
            .search(
                &BackendQuery::new("rnaseq")
                    .with_scope(SearchScope::PackageEntry)
                    .with_package("team/pkg"),
            )
            .await;

        let bodies = transport.bodies.lock();
        assert_eq!(
            bodies[0]["query"]["bool"]["filter"],
            json!([ElasticsearchBackend::package_clause("team/pkg")])
        );
        assert!(bodies[0].get("collapse").is_none());
    }

    #[tokio::test]
    async fn test_configured_collapse_applies_to_package_scope_only() {
        let (backend, transport) = backend(2, 10);
        let backend = backend.with_package_collapse(Some("ptr_name".to_string()));

        backend
            .search(&BackendQuery::new("rnaseq").with_scope(SearchScope::PackageEntry))
            .await;
        backend
            .search(&BackendQuery::new("rnaseq").with_scope(SearchScope::Global))
            .await;

        let bodies = transport.bodies.lock();
        assert_eq!(bodies[0]["collapse"], json!({ "field": "ptr_name" }));
        assert!(bodies[1].get("collapse").is_none());
    }

    #[tokio::test]
    async fn test_degradation_stops_at_first_success() {
        let (backend, transport) = backend(120, 40);
        let response = backend
            .search(&BackendQuery::new("reads").with_scope(SearchScope::File))
            .await;

        assert!(response.is_success());
        assert_eq!(response.total, 1);
        assert_eq!(bucket_counts(&transport), vec![120, 50, 40]);
    }

    #[tokio::test]
    async fn test_degradation_skips_steps_not_smaller_than_bucket_set() {
        let (backend, transport) = backend(45, 20);
        let response = backend
            .search(&BackendQuery::new("reads").with_scope(SearchScope::File))
            .await;

        assert!(response.is_success());
        assert_eq!(bucket_counts(&transport), vec![45, 40, 30, 20]);
    }

    #[tokio::test]
    async fn test_degradation_exhausted_returns_original_error() {
        let (backend, transport) = backend(120, 5);
        let response = backend
            .search(&BackendQuery::new("reads").with_scope(SearchScope::File))
            .await;

        assert_eq!(response.status, BackendStatus::Error);
        assert_eq!(response.error_category, Some(crate::search::error::ErrorCategory::Authorization));
        assert_eq!(bucket_counts(&transport), vec![120, 50, 40, 30, 20, 10]);
    }

    #[tokio::test]
    async fn test_explicit_bucket_is_never_degraded() {
        let (backend, transport) = backend(120, 0);
        let response = backend
            .search(
                &BackendQuery::new("reads")
                    .with_scope(SearchScope::File)
                    .with_bucket("s3://bucket-7/data/"),
            )
            .await;

        assert!(!response.is_success());
        assert_eq!(*transport.calls.lock(), vec!["bucket-7".to_string()]);
    }

    #[tokio::test]
    async fn test_default_bucket_searched_first() {
        let (backend, transport) = backend(3, 10);
        let backend = backend.with_default_bucket(Some("s3://bucket-2".to_string()));
        backend
            .search(&BackendQuery::new("reads").with_scope(SearchScope::File))
            .await;

        assert_eq!(
            *transport.calls.lock(),
            vec!["bucket-2,bucket-0,bucket-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_search_is_unavailable() {
        let session = Arc::new(FakeSession {
            authenticated: false,
            buckets: Vec::new(),
        });
        let transport = Arc::new(CappedTransport {
            max_buckets: 10,
            calls: parking_lot::Mutex::new(Vec::new()),
            bodies: parking_lot::Mutex::new(Vec::new()),
        });
        let backend = ElasticsearchBackend::new(session, transport.clone());

        let response = backend.search(&BackendQuery::new("reads")).await;
        assert_eq!(response.status, BackendStatus::Unavailable);
        assert_eq!(response.error_category, Some(crate::search::error::ErrorCategory::Authentication));
        assert!(transport.calls.lock().is_empty());
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_count_reads_total() {
        let (backend, _) = backend(2, 10);
        let count = backend
            .count(&BackendQuery::new("reads").with_scope(SearchScope::File))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
