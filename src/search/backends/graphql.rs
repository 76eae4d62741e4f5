//! Structured-query backend over the catalog's GraphQL API

use crate::search::backends::{failure_response, BackendQuery, SearchBackend};
use crate::search::catalog::{
    list_bucket_names, normalize_bucket, require_session, SessionProvider,
};
use crate::search::error::{SearchError, SearchResult};
use crate::search::result::{
    coerce_size, extension_of, BackendResponse, BackendType, CanonicalSearchResult, ResultType,
};
use crate::search::scope::SearchScope;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const OBJECTS_FIELD: &str = "searchObjects";
const PACKAGES_FIELD: &str = "searchPackages";

const OBJECT_HIT_FIELDS: &str = "id score bucket key size modified";
const PACKAGE_HIT_FIELDS: &str = "id score bucket name hash size modified comment";

/// One result set from a search field
#[derive(Debug, Default)]
struct ResultSet {
    total: u64,
    hits: Vec<Value>,
}

/// Structured search backend
pub struct GraphqlBackend {
    session: Arc<dyn SessionProvider>,
}

impl GraphqlBackend {
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        Self { session }
    }

    /// Search fields queried for a scope
    fn fields(scope: SearchScope) -> &'static [&'static str] {
        match scope {
            SearchScope::File => &[OBJECTS_FIELD],
            SearchScope::PackageEntry => &[PACKAGES_FIELD],
            SearchScope::Global => &[OBJECTS_FIELD, PACKAGES_FIELD],
        }
    }

    /// Build the query document; `with_hits = false` only asks for totals
    fn document(scope: SearchScope, with_hits: bool) -> String {
        let selections: Vec<String> = Self::fields(scope)
            .iter()
            .map(|field| {
                let (result_set, hit_fields) = if *field == OBJECTS_FIELD {
                    ("ObjectsSearchResultSet", OBJECT_HIT_FIELDS)
                } else {
                    ("PackagesSearchResultSet", PACKAGE_HIT_FIELDS)
                };
                let page = if with_hits {
                    format!(" firstPage(size: $size) {{ hits {{ {} }} }}", hit_fields)
                } else {
                    String::new()
                };
                format!(
                    "{field}(buckets: $buckets, searchString: $searchString) {{ __typename \
                     ... on {result_set} {{ total{page} }} \
                     ... on InvalidInput {{ errors {{ path message }} }} \
                     ... on OperationError {{ name message }} }}",
                    field = field,
                    result_set = result_set,
                    page = page,
                )
            })
            .collect();

        let size_variable = if with_hits { ", $size: Int" } else { "" };
        format!(
            "query UnifiedSearch($buckets: [String!], $searchString: String{}) {{ {} }}",
            size_variable,
            selections.join(" ")
        )
    }

    fn variables(query: &BackendQuery, with_hits: bool) -> Value {
        let buckets = query
            .bucket
            .as_deref()
            .map(normalize_bucket)
            .filter(|bucket| !bucket.is_empty())
            .map(|bucket| json!([bucket]))
            .unwrap_or(Value::Null);

        let mut variables = json!({
            "buckets": buckets,
            "searchString": query.query.trim(),
        });
        if with_hits {
            variables["size"] = json!(query.limit);
        }
        variables
    }

    /// Extract one result set, surfacing invalid input and operation errors
    fn read_result_set(data: &Value, field: &str) -> SearchResult<ResultSet> {
        let set = match data.get(field) {
            Some(Value::Null) | None => return Ok(ResultSet::default()),
            Some(set) => set,
        };

        match set.get("__typename").and_then(Value::as_str) {
            Some("InvalidInput") => {
                let messages = set
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|errors| {
                        errors
                            .iter()
                            .filter_map(|e| e.get("message").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .unwrap_or_default();
                Err(SearchError::InvalidQuery(messages))
            }
            Some("OperationError") => {
                let message = set
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("operation error");
                Err(SearchError::SearchFailed(message.to_string()))
            }
            _ => Ok(ResultSet {
                total: set.get("total").and_then(Value::as_u64).unwrap_or(0),
                hits: set
                    .get("firstPage")
                    .and_then(|page| page.get("hits"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            }),
        }
    }

    fn str_field<'a>(hit: &'a Value, field: &str) -> Option<&'a str> {
        hit.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn metadata_of(hit: &Value) -> Map<String, Value> {
        hit.as_object().cloned().unwrap_or_default()
    }

    fn normalize_object(hit: &Value) -> Option<CanonicalSearchResult> {
        let Some(key) = Self::str_field(hit, "key") else {
            warn!(backend = "graphql", "Dropping object hit without a key");
            return None;
        };
        let bucket = Self::str_field(hit, "bucket").map(str::to_string);
        let s3_uri = bucket.as_ref().map(|b| format!("s3://{}/{}", b, key));

        Some(CanonicalSearchResult {
            id: Self::str_field(hit, "id")
                .map(str::to_string)
                .or_else(|| s3_uri.clone())
                .unwrap_or_else(|| key.to_string()),
            result_type: ResultType::File,
            name: key.to_string(),
            title: key.rsplit('/').next().unwrap_or(key).to_string(),
            description: match &bucket {
                Some(bucket) => format!("Object in bucket {}", bucket),
                None => "Object".to_string(),
            },
            score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            backend: BackendType::Graphql,
            bucket,
            s3_uri,
            size: hit.get("size").and_then(coerce_size),
            last_modified: Self::str_field(hit, "modified").map(str::to_string),
            content_type: None,
            extension: extension_of(key),
            metadata: Self::metadata_of(hit),
        })
    }

    fn normalize_package(hit: &Value) -> Option<CanonicalSearchResult> {
        let Some(name) = Self::str_field(hit, "name") else {
            warn!(backend = "graphql", "Dropping package hit without a name");
            return None;
        };
        let bucket = Self::str_field(hit, "bucket").map(str::to_string);
        let hash = Self::str_field(hit, "hash");
        let s3_uri = match (&bucket, hash) {
            (Some(bucket), Some(hash)) => Some(format!("s3://{}/.quilt/packages/{}", bucket, hash)),
            _ => None,
        };

        Some(CanonicalSearchResult {
            id: Self::str_field(hit, "id")
                .map(str::to_string)
                .unwrap_or_else(|| name.to_string()),
            result_type: ResultType::PackageEntry,
            name: name.to_string(),
            title: name.to_string(),
            description: Self::str_field(hit, "comment")
                .map(str::to_string)
                .unwrap_or_else(|| format!("Package {}", name)),
            score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            backend: BackendType::Graphql,
            bucket,
            s3_uri,
            size: hit.get("size").and_then(coerce_size),
            last_modified: Self::str_field(hit, "modified").map(str::to_string),
            content_type: None,
            extension: None,
            metadata: Self::metadata_of(hit),
        })
    }

    async fn execute(&self, query: &BackendQuery, with_hits: bool) -> SearchResult<Vec<(&'static str, ResultSet)>> {
        require_session(self.session.as_ref())?;

        let document = Self::document(query.scope, with_hits);
        let data = self
            .session
            .graphql(&document, Self::variables(query, with_hits))
            .await?;

        Self::fields(query.scope)
            .iter()
            .map(|field| Self::read_result_set(&data, field).map(|set| (*field, set)))
            .collect()
    }
}

#[async_trait]
impl SearchBackend for GraphqlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Graphql
    }

    async fn probe(&self) -> SearchResult<()> {
        require_session(self.session.as_ref())?;
        list_bucket_names(self.session.as_ref()).await?;
        Ok(())
    }

    async fn search(&self, query: &BackendQuery) -> BackendResponse {
        let start = Instant::now();

        match self.execute(query, true).await {
            Ok(sets) => {
                let mut results = Vec::new();
                let mut total = 0;
                for (field, set) in sets {
                    total += set.total;
                    let normalize: fn(&Value) -> Option<CanonicalSearchResult> = if field == OBJECTS_FIELD {
                        Self::normalize_object
                    } else {
                        Self::normalize_package
                    };
                    let before = results.len();
                    results.extend(set.hits.iter().filter_map(normalize));
                    debug!(field, hits = results.len() - before, "Normalized result set");
                }

                let query_time_ms = start.elapsed().as_millis() as u64;
                info!(
                    backend = "graphql",
                    scope = query.scope.as_str(),
                    result_count = results.len(),
                    total,
                    query_time_ms,
                    "Search completed"
                );
                BackendResponse::success(BackendType::Graphql, results, total, query_time_ms)
            }
            Err(err) => {
                let query_time_ms = start.elapsed().as_millis() as u64;
                warn!(backend = "graphql", error = %err, "Search failed");
                failure_response(BackendType::Graphql, &err, query_time_ms)
            }
        }
    }

    async fn count(&self, query: &BackendQuery) -> SearchResult<u64> {
        let sets = self.execute(query, false).await?;
        Ok(sets.iter().map(|(_, set)| set.total).sum())
    }
}
