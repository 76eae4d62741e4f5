//! End-to-end tests for the unified search over in-memory catalog fakes

use async_trait::async_trait;
use catalog_unified_search::config::SearchSettings;
use catalog_unified_search::search::catalog::CatalogResult;
use catalog_unified_search::search::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

const PACKAGES_SUFFIX: &str = "_packages";

/// Session with a fixed bucket list; GraphQL searches answer with `search_data`
struct FakeSession {
    authenticated: bool,
    buckets: Vec<String>,
    search_data: Value,
}

impl FakeSession {
    fn with_buckets(count: usize) -> Self {
        Self {
            authenticated: true,
            buckets: (0..count).map(|i| format!("bucket-{}", i)).collect(),
            search_data: json!({}),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn registry_url(&self) -> Option<String> {
        Some("https://registry.example.com".to_string())
    }

    async fn graphql(&self, query: &str, _variables: Value) -> CatalogResult<Value> {
        if query.contains("bucketConfigs") {
            let configs: Vec<Value> = self.buckets.iter().map(|b| json!({ "name": b })).collect();
            return Ok(json!({ "bucketConfigs": configs }));
        }
        Ok(self.search_data.clone())
    }
}

/// Index transport that rejects patterns spanning more than `max_buckets` buckets
struct FakeTransport {
    max_buckets: usize,
    hits: Value,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeTransport {
    fn new(max_buckets: usize, hits: Value) -> Self {
        Self {
            max_buckets,
            hits,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn bucket_counts(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .map(|(index, _)| bucket_count(index))
            .collect()
    }
}

fn bucket_count(index: &str) -> usize {
    index
        .split(',')
        .filter(|i| !i.ends_with(PACKAGES_SUFFIX))
        .count()
}

#[async_trait]
impl SearchTransport for FakeTransport {
    async fn search(&self, _query: &Value, index: &str, limit: usize) -> CatalogResult<Value> {
        self.calls.lock().push((index.to_string(), limit));
        if bucket_count(index) > self.max_buckets {
            return Err(CatalogError::Http {
                status: 403,
                message: "Forbidden".to_string(),
            });
        }
        Ok(self.hits.clone())
    }
}

fn mixed_hits() -> Value {
    json!({
        "hits": {
            "total": { "value": 4 },
            "hits": [
                {
                    "_index": "bucket-0",
                    "_id": "f1",
                    "_score": 1.5,
                    "_source": { "key": "runs/reads.csv", "size": 2048 }
                },
                {
                    "_index": "bucket-1",
                    "_id": "f2",
                    "_score": 2.5,
                    "_source": { "key": "runs/notes.txt", "size": 10 }
                },
                {
                    "_index": "bucket-0_packages-reindex-v7",
                    "_id": "p1",
                    "_score": 1.0,
                    "_source": { "ptr_name": "team/rnaseq", "mnfst_hash": "abc123" }
                },
                {
                    "_index": "bucket-0_packages",
                    "_id": "p2",
                    "_score": 9.0,
                    "_source": { "entry_size": 77 }
                }
            ]
        }
    })
}

fn unified(session: FakeSession, transport: Arc<FakeTransport>) -> UnifiedSearch {
    UnifiedSearch::from_clients(Arc::new(session), transport, &SearchSettings::default())
}

#[tokio::test]
async fn test_global_search_degrades_and_normalizes() {
    let transport = Arc::new(FakeTransport::new(40, mixed_hits()));
    let search = unified(FakeSession::with_buckets(120), transport.clone());

    let outcome = search
        .search(&SearchRequest::new("csv files").with_metadata(true))
        .await;
    let SearchOutcome::Success(response) = outcome else {
        panic!("expected a successful search");
    };

    assert_eq!(transport.bucket_counts(), vec![120, 50, 40]);
    assert!(response.success);
    assert_eq!(response.backend_used, BackendType::Elasticsearch);

    // The invalid package hit is dropped and the .txt file is post-filtered
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["f1", "p1"]);

    let package = &response.results[1];
    assert_eq!(package.result_type, ResultType::PackageEntry);
    assert_eq!(package.bucket.as_deref(), Some("bucket-0"));
    assert_eq!(
        package.s3_uri.as_deref(),
        Some("s3://bucket-0/.quilt/packages/abc123")
    );
    assert_eq!(response.results[0].metadata["_index"], "bucket-0");
    assert!(response.analysis.is_some());
}

#[tokio::test]
async fn test_unauthenticated_session_returns_fix_it_payload() {
    let session = FakeSession {
        authenticated: false,
        ..FakeSession::with_buckets(3)
    };
    let transport = Arc::new(FakeTransport::new(10, mixed_hits()));
    let search = unified(session, transport.clone());

    let outcome = search.search(&SearchRequest::new("reads")).await;
    assert!(!outcome.is_success());

    let payload = outcome.to_json();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error_category"], "authentication");
    assert_eq!(payload["details"]["authenticated"], false);
    assert!(payload["fix"]["required_action"].is_string());
    assert!(payload["alternatives"].as_object().unwrap().len() >= 1);
    assert!(transport.calls.lock().is_empty());
}

#[tokio::test]
async fn test_explicit_graphql_backend() {
    let session = FakeSession {
        search_data: json!({
            "searchPackages": {
                "__typename": "PackagesSearchResultSet",
                "total": 1,
                "firstPage": { "hits": [
                    { "id": "team/rnaseq@abc", "score": 3.0, "bucket": "bucket-0",
                      "name": "team/rnaseq", "hash": "abc" }
                ]}
            }
        }),
        ..FakeSession::with_buckets(2)
    };
    let transport = Arc::new(FakeTransport::new(10, mixed_hits()));
    let search = unified(session, transport.clone());

    let outcome = search
        .search(
            &SearchRequest::new("rnaseq")
                .with_scope("packageEntry")
                .with_backend("graphql"),
        )
        .await;
    let SearchOutcome::Success(response) = outcome else {
        panic!("expected a successful search");
    };

    assert_eq!(response.backend_used, BackendType::Graphql);
    assert_eq!(response.total_results, 1);
    assert_eq!(response.results[0].name, "team/rnaseq");
    assert!(transport.calls.lock().is_empty());
}

#[tokio::test]
async fn test_count_only_uses_zero_size() {
    let transport = Arc::new(FakeTransport::new(10, mixed_hits()));
    let search = unified(FakeSession::with_buckets(3), transport.clone());

    let outcome = search
        .search(&SearchRequest::new("reads").with_count_only(true))
        .await;
    let payload = outcome.to_json();

    assert_eq!(payload["count"], 4);
    assert_eq!(payload["backend_used"], "elasticsearch");
    assert_eq!(transport.calls.lock()[0].1, 0);
}

#[tokio::test]
async fn test_bucket_target_is_searched_alone() {
    let transport = Arc::new(FakeTransport::new(0, mixed_hits()));
    let search = unified(FakeSession::with_buckets(120), transport.clone());

    let outcome = search
        .search(
            &SearchRequest::new("reads")
                .with_scope("bucket")
                .with_target("s3://bucket-9/some/prefix"),
        )
        .await;
    let SearchOutcome::Success(response) = outcome else {
        panic!("expected a response payload");
    };

    // A single explicit bucket is never degraded
    assert!(!response.success);
    assert_eq!(response.backend_status.status, BackendStatus::Error);
    let failure = response.failure.as_ref().expect("failed search carries a fix-it payload");
    assert_eq!(failure.error_category, ErrorCategory::Authorization);
    let calls = transport.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "bucket-9,bucket-9_packages");
}

#[tokio::test]
async fn test_exhausted_degradation_returns_fix_it_payload() {
    let transport = Arc::new(FakeTransport::new(5, mixed_hits()));
    let search = unified(FakeSession::with_buckets(120), transport.clone());

    let outcome = search.search(&SearchRequest::new("reads")).await;
    assert!(!outcome.is_success());
    assert_eq!(transport.bucket_counts(), vec![120, 50, 40, 30, 20, 10]);

    let payload = outcome.to_json();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error_category"], "authorization");
    assert!(payload["fix"]["required_action"].is_string());
    assert!(!payload["alternatives"].as_object().unwrap().is_empty());
    assert_eq!(payload["details"]["catalog_url"], "https://registry.example.com");
    assert_eq!(payload["backend_status"]["status"], "error");
    assert!(payload["backend_status"]["error"]
        .as_str()
        .unwrap()
        .contains("403"));
}

#[tokio::test]
async fn test_successful_search_has_no_error_fields() {
    let transport = Arc::new(FakeTransport::new(10, mixed_hits()));
    let search = unified(FakeSession::with_buckets(3), transport);

    let payload = search.search(&SearchRequest::new("reads")).await.to_json();
    assert_eq!(payload["success"], true);
    assert!(payload.get("error_category").is_none());
    assert!(payload.get("fix").is_none());
}

#[tokio::test]
async fn test_status_report_lists_every_backend() {
    let transport = Arc::new(FakeTransport::new(10, mixed_hits()));
    let search = unified(FakeSession::with_buckets(1), transport);

    let report = search.status().await;
    assert_eq!(report.len(), 2);
    assert_eq!(report["elasticsearch"].status, BackendStatus::Available);
    assert_eq!(report["graphql"].status, BackendStatus::Available);
}
