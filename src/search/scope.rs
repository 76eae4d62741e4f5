//! Scope handlers
//!
//! A scope decides which indices a query targets and how a raw hit from those
//! indices becomes a [`CanonicalSearchResult`]. Object indices are named after
//! their bucket; package indices carry a `_packages` suffix and hold two document
//! shapes (manifests and entries) side by side.

use crate::search::error::{SearchError, SearchResult};
use crate::search::result::{
    coerce_size, extension_of, BackendType, CanonicalSearchResult, ResultType,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

/// Suffix of package index names
pub const PACKAGES_SUFFIX: &str = "_packages";

/// Which documents a search covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SearchScope {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "packageEntry")]
    PackageEntry,
    #[default]
    #[serde(rename = "global")]
    Global,
}

impl SearchScope {
    /// Parse a scope name; anything that is not a file or package scope is global
    pub fn parse(scope: &str) -> Self {
        match scope.trim().to_ascii_lowercase().as_str() {
            "file" | "files" | "object" | "objects" => SearchScope::File,
            "packageentry" | "package" | "packages" => SearchScope::PackageEntry,
            _ => SearchScope::Global,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::File => "file",
            SearchScope::PackageEntry => "packageEntry",
            SearchScope::Global => "global",
        }
    }

    /// Handler implementing this scope
    pub fn handler(&self) -> Box<dyn ScopeHandler> {
        match self {
            SearchScope::File => Box::new(FileScopeHandler),
            SearchScope::PackageEntry => Box::new(PackageEntryScopeHandler::default()),
            SearchScope::Global => Box::new(GlobalScopeHandler::default()),
        }
    }
}

/// A query clause substituted by a scope, plus an optional collapse directive
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeQuery {
    pub clause: Value,
    pub collapse: Option<Value>,
}

/// Per-scope index naming and hit parsing
pub trait ScopeHandler: Send + Sync {
    fn scope(&self) -> SearchScope;

    /// Comma-separated index pattern for `buckets`; fails on an empty list
    fn build_index_pattern(&self, buckets: &[String]) -> SearchResult<String>;

    /// Parse one raw hit; `None` means the hit is invalid and must be dropped
    fn parse_result(&self, hit: &Value, bucket: &str) -> Option<CanonicalSearchResult>;

    /// Optionally replace the base full-text clause with a scope-specific one
    fn query_clause(&self, _base: &Value) -> Option<ScopeQuery> {
        None
    }
}

fn require_buckets(buckets: &[String]) -> SearchResult<()> {
    if buckets.is_empty() {
        return Err(SearchError::InvalidIndexPattern(
            "bucket list must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn source_of(hit: &Value) -> Map<String, Value> {
    hit.get("_source")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn non_empty_str<'a>(source: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    source
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn hit_score(hit: &Value) -> f64 {
    hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0)
}

fn hit_index(hit: &Value) -> &str {
    hit.get("_index").and_then(Value::as_str).unwrap_or("")
}

fn hit_id(hit: &Value) -> Option<String> {
    hit.get("_id").and_then(Value::as_str).map(str::to_string)
}

fn with_index(mut metadata: Map<String, Value>, hit: &Value) -> Map<String, Value> {
    metadata.insert("_index".to_string(), Value::String(hit_index(hit).to_string()));
    metadata
}

/// Objects: one index per bucket
#[derive(Debug, Clone, Copy, Default)]
pub struct FileScopeHandler;

impl ScopeHandler for FileScopeHandler {
    fn scope(&self) -> SearchScope {
        SearchScope::File
    }

    fn build_index_pattern(&self, buckets: &[String]) -> SearchResult<String> {
        require_buckets(buckets)?;
        Ok(buckets.join(","))
    }

    fn parse_result(&self, hit: &Value, bucket: &str) -> Option<CanonicalSearchResult> {
        let source = source_of(hit);

        let key = non_empty_str(&source, "key").map(str::to_string);
        let size = source.get("size").and_then(coerce_size);
        let last_modified = non_empty_str(&source, "last_modified").map(str::to_string);
        let content_type = non_empty_str(&source, "content_type").map(str::to_string);
        let extension = key.as_deref().and_then(extension_of).or_else(|| {
            non_empty_str(&source, "ext")
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
        });

        let bucket = (!bucket.is_empty()).then(|| bucket.to_string());
        let s3_uri = match (&bucket, &key) {
            (Some(bucket), Some(key)) => Some(format!("s3://{}/{}", bucket, key)),
            _ => None,
        };

        let id = hit_id(hit)
            .or_else(|| key.clone())
            .unwrap_or_default();
        let name = key.clone().unwrap_or_else(|| id.clone());
        let title = name.rsplit('/').next().unwrap_or(&name).to_string();
        let description = match &bucket {
            Some(bucket) => format!("Object in bucket {}", bucket),
            None => "Object".to_string(),
        };

        Some(CanonicalSearchResult {
            id,
            result_type: ResultType::File,
            name,
            title,
            description,
            score: hit_score(hit),
            backend: BackendType::Elasticsearch,
            bucket,
            s3_uri,
            size,
            last_modified,
            content_type,
            extension,
            metadata: with_index(source, hit),
        })
    }
}

/// Package manifests and entries: one `<bucket>_packages` index per bucket
#[derive(Debug, Clone, Default)]
pub struct PackageEntryScopeHandler {
    collapse_field: Option<String>,
}

impl PackageEntryScopeHandler {
    /// Collapse hits sharing `field` into one result
    pub fn with_collapse(mut self, field: impl Into<String>) -> Self {
        self.collapse_field = Some(field.into());
        self
    }

    /// Package identifier: ptr_name, mnfst_name, entry_pk (without `@hash`), entry_lk
    fn package_name(source: &Map<String, Value>) -> Option<String> {
        non_empty_str(source, "ptr_name")
            .or_else(|| non_empty_str(source, "mnfst_name"))
            .or_else(|| {
                non_empty_str(source, "entry_pk")
                    .map(|pk| pk.split('@').next().unwrap_or(pk))
                    .filter(|pk| !pk.is_empty())
            })
            .or_else(|| non_empty_str(source, "entry_lk"))
            .map(str::to_string)
    }

    fn top_hash(source: &Map<String, Value>) -> Option<String> {
        non_empty_str(source, "mnfst_hash")
            .or_else(|| {
                non_empty_str(source, "entry_pk")
                    .and_then(|pk| pk.split_once('@'))
                    .map(|(_, hash)| hash)
                    .filter(|hash| !hash.is_empty())
            })
            .map(str::to_string)
    }

    fn size(source: &Map<String, Value>) -> Option<u64> {
        source
            .get("mnfst_stats")
            .and_then(|stats| stats.get("total_bytes"))
            .and_then(coerce_size)
            .or_else(|| source.get("entry_size").and_then(coerce_size))
    }
}

impl ScopeHandler for PackageEntryScopeHandler {
    fn scope(&self) -> SearchScope {
        SearchScope::PackageEntry
    }

    fn build_index_pattern(&self, buckets: &[String]) -> SearchResult<String> {
        require_buckets(buckets)?;
        Ok(buckets
            .iter()
            .map(|bucket| format!("{}{}", bucket, PACKAGES_SUFFIX))
            .collect::<Vec<_>>()
            .join(","))
    }

    fn parse_result(&self, hit: &Value, bucket: &str) -> Option<CanonicalSearchResult> {
        let source = source_of(hit);

        let Some(name) = Self::package_name(&source) else {
            warn!(
                index = hit_index(hit),
                id = hit_id(hit).as_deref().unwrap_or(""),
                "Dropping package hit without a package identifier"
            );
            return None;
        };

        let hash = Self::top_hash(&source);
        let logical_key = non_empty_str(&source, "entry_lk").map(str::to_string);
        let bucket = (!bucket.is_empty()).then(|| bucket.to_string());
        let s3_uri = match (&bucket, &hash) {
            (Some(bucket), Some(hash)) => {
                Some(format!("s3://{}/.quilt/packages/{}", bucket, hash))
            }
            _ => None,
        };

        let last_modified = non_empty_str(&source, "ptr_last_modified")
            .or_else(|| non_empty_str(&source, "mnfst_last_modified"))
            .or_else(|| non_empty_str(&source, "last_modified"))
            .map(str::to_string);

        let title = match &logical_key {
            Some(lk) if lk != &name => format!("{} / {}", name, lk),
            _ => name.clone(),
        };
        let description = non_empty_str(&source, "mnfst_message")
            .or_else(|| non_empty_str(&source, "comment"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Package {}", name));

        let mut metadata = with_index(source.clone(), hit);
        if let Some(hash) = &hash {
            metadata.insert("top_hash".to_string(), Value::String(hash.clone()));
        }

        Some(CanonicalSearchResult {
            id: hit_id(hit).unwrap_or_else(|| name.clone()),
            result_type: ResultType::PackageEntry,
            name,
            title,
            description,
            score: hit_score(hit),
            backend: BackendType::Elasticsearch,
            bucket,
            s3_uri,
            size: Self::size(&source),
            last_modified,
            content_type: None,
            extension: logical_key.as_deref().and_then(extension_of),
            metadata,
        })
    }

    fn query_clause(&self, base: &Value) -> Option<ScopeQuery> {
        // Manifests rank above individual entries for equal text relevance
        let clause = json!({
            "bool": {
                "must": [base.clone()],
                "should": [
                    { "exists": { "field": "mnfst_name", "boost": 2.0 } },
                    { "exists": { "field": "ptr_name", "boost": 2.0 } }
                ],
                "filter": []
            }
        });
        let collapse = self
            .collapse_field
            .as_ref()
            .map(|field| json!({ "field": field }));
        Some(ScopeQuery { clause, collapse })
    }
}

/// Objects and packages together
#[derive(Debug, Clone, Default)]
pub struct GlobalScopeHandler {
    files: FileScopeHandler,
    packages: PackageEntryScopeHandler,
}

impl ScopeHandler for GlobalScopeHandler {
    fn scope(&self) -> SearchScope {
        SearchScope::Global
    }

    fn build_index_pattern(&self, buckets: &[String]) -> SearchResult<String> {
        let files = self.files.build_index_pattern(buckets)?;
        let packages = self.packages.build_index_pattern(buckets)?;
        Ok(format!("{},{}", files, packages))
    }

    fn parse_result(&self, hit: &Value, bucket: &str) -> Option<CanonicalSearchResult> {
        if hit_index(hit).contains(PACKAGES_SUFFIX) {
            self.packages.parse_result(hit, bucket)
        } else {
            self.files.parse_result(hit, bucket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_patterns() {
        let ab = buckets(&["a", "b"]);
        assert_eq!(FileScopeHandler.build_index_pattern(&ab).unwrap(), "a,b");
        assert_eq!(
            PackageEntryScopeHandler::default().build_index_pattern(&ab).unwrap(),
            "a_packages,b_packages"
        );
        assert_eq!(
            GlobalScopeHandler::default().build_index_pattern(&ab).unwrap(),
            "a,b,a_packages,b_packages"
        );
    }

    #[test]
    fn test_empty_bucket_list_fails() {
        for scope in [SearchScope::File, SearchScope::PackageEntry, SearchScope::Global] {
            let result = scope.handler().build_index_pattern(&[]);
            assert!(matches!(result, Err(SearchError::InvalidIndexPattern(_))));
        }
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(SearchScope::parse("file"), SearchScope::File);
        assert_eq!(SearchScope::parse("packageEntry"), SearchScope::PackageEntry);
        assert_eq!(SearchScope::parse("bucket"), SearchScope::Global);
        assert_eq!(SearchScope::parse(""), SearchScope::Global);
    }

    #[test]
    fn test_file_hit_parsing() {
        let hit = json!({
            "_id": "obj-1",
            "_index": "bkt",
            "_score": 3.5,
            "_source": {
                "key": "runs/2024/reads.CSV",
                "size": "2048",
                "last_modified": "2024-01-02T00:00:00Z",
                "content_type": "text/csv"
            }
        });

        let result = FileScopeHandler.parse_result(&hit, "bkt").unwrap();
        assert_eq!(result.result_type, ResultType::File);
        assert_eq!(result.name, "runs/2024/reads.CSV");
        assert_eq!(result.title, "reads.CSV");
        assert_eq!(result.s3_uri.as_deref(), Some("s3://bkt/runs/2024/reads.CSV"));
        assert_eq!(result.size, Some(2048));
        assert_eq!(result.extension.as_deref(), Some("csv"));
        assert_eq!(result.metadata["_index"], "bkt");
        assert_eq!(result.score, 3.5);
    }

    #[test]
    fn test_file_hit_without_key_has_no_uri() {
        let hit = json!({ "_id": "x", "_index": "bkt", "_source": { "ext": ".TSV" } });
        let result = FileScopeHandler.parse_result(&hit, "bkt").unwrap();
        assert_eq!(result.s3_uri, None);
        assert_eq!(result.extension.as_deref(), Some("tsv"));
        assert_eq!(result.name, "x");
    }

    #[test]
    fn test_manifest_hit_parsing() {
        let hit = json!({
            "_id": "m-1",
            "_index": "bkt_packages",
            "_score": 1.0,
            "_source": {
                "ptr_name": "team/rnaseq",
                "mnfst_name": "team/rnaseq-old",
                "mnfst_hash": "abc123",
                "mnfst_stats": { "total_bytes": 5000 },
                "entry_size": 10
            }
        });

        let result = PackageEntryScopeHandler::default().parse_result(&hit, "bkt").unwrap();
        assert_eq!(result.result_type, ResultType::PackageEntry);
        assert_eq!(result.name, "team/rnaseq");
        assert_eq!(result.size, Some(5000));
        assert_eq!(result.s3_uri.as_deref(), Some("s3://bkt/.quilt/packages/abc123"));
    }

    #[test]
    fn test_entry_hit_parsing() {
        let hit = json!({
            "_id": "e-1",
            "_index": "bkt_packages",
            "_source": {
                "entry_pk": "team/rnaseq@deadbeef",
                "entry_lk": "data/counts.tsv",
                "entry_hash": { "type": "SHA256", "value": "ff" },
                "entry_size": 321
            }
        });

        let result = PackageEntryScopeHandler::default().parse_result(&hit, "bkt").unwrap();
        assert_eq!(result.name, "team/rnaseq");
        assert_eq!(result.size, Some(321));
        assert_eq!(result.title, "team/rnaseq / data/counts.tsv");
        assert_eq!(result.metadata["top_hash"], "deadbeef");
        assert_eq!(result.extension.as_deref(), Some("tsv"));
    }

    #[test]
    fn test_entry_logical_key_as_last_resort() {
        let hit = json!({ "_index": "bkt_packages", "_source": { "entry_lk": "readme.md" } });
        let result = PackageEntryScopeHandler::default().parse_result(&hit, "").unwrap();
        assert_eq!(result.name, "readme.md");
        assert_eq!(result.s3_uri, None);
    }

    #[test]
    fn test_package_hit_without_identifier_is_dropped() {
        let hit = json!({ "_id": "bad", "_index": "bkt_packages", "_source": { "entry_size": 99 } });
        assert!(PackageEntryScopeHandler::default().parse_result(&hit, "bkt").is_none());
        assert!(GlobalScopeHandler::default().parse_result(&hit, "bkt").is_none());
    }

    #[test]
    fn test_global_dispatches_on_index_name() {
        let handler = GlobalScopeHandler::default();
        let file_hit = json!({ "_index": "bkt", "_source": { "key": "a.txt" } });
        let pkg_hit = json!({ "_index": "bkt_packages-reindex-v2", "_source": { "ptr_name": "a/b" } });

        assert_eq!(handler.parse_result(&file_hit, "bkt").unwrap().result_type, ResultType::File);
        assert_eq!(
            handler.parse_result(&pkg_hit, "bkt").unwrap().result_type,
            ResultType::PackageEntry
        );
    }

    #[test]
    fn test_package_query_clause() {
        let base = json!({ "query_string": { "query": "reads" } });
        let handler = PackageEntryScopeHandler::default();
        let scoped = handler.query_clause(&base).unwrap();
        assert_eq!(scoped.clause["bool"]["must"][0], base);
        assert!(scoped.clause["bool"]["filter"].as_array().unwrap().is_empty());
        assert!(scoped.collapse.is_none());

        let scoped = handler.with_collapse("ptr_name").query_clause(&base).unwrap();
        assert_eq!(scoped.collapse, Some(json!({ "field": "ptr_name" })));

        assert!(FileScopeHandler.query_clause(&base).is_none());
    }
}
