//! Canonical result and backend response types shared by every backend

use crate::search::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifies a search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Full-text index, one index per bucket
    Elasticsearch,
    /// Structured queries through the catalog's GraphQL API
    Graphql,
    /// Direct storage listing; only ever suggested, never registered
    S3,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Elasticsearch => "elasticsearch",
            BackendType::Graphql => "graphql",
            BackendType::S3 => "s3",
        }
    }

    /// Parse a backend name; returns `None` for unknown names and for "auto"
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" | "es" => Some(BackendType::Elasticsearch),
            "graphql" => Some(BackendType::Graphql),
            "s3" => Some(BackendType::S3),
            _ => None,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a backend, or the outcome of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Available,
    Unavailable,
    Error,
    Timeout,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendStatus::Available => "available",
            BackendStatus::Unavailable => "unavailable",
            BackendStatus::Error => "error",
            BackendStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Kind of object a result describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultType {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "packageEntry")]
    PackageEntry,
}

/// A single search hit, independent of the backend that produced it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalSearchResult {
    pub id: String,

    #[serde(rename = "type")]
    pub result_type: ResultType,

    /// Logical key for files, package name for package entries
    pub name: String,

    pub title: String,

    pub description: String,

    /// Backend-native relevance
    pub score: f64,

    /// Backend that produced the hit
    pub backend: BackendType,

    pub bucket: Option<String>,

    pub s3_uri: Option<String>,

    pub size: Option<u64>,

    pub last_modified: Option<String>,

    pub content_type: Option<String>,

    pub extension: Option<String>,

    /// Backend-native fields plus `_index`
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CanonicalSearchResult {
    /// Logical key recorded by the backend, if any
    pub fn metadata_key(&self) -> Option<&str> {
        self.metadata.get("key").and_then(Value::as_str)
    }
}

/// The outcome of one backend call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    pub backend_type: BackendType,
    pub status: BackendStatus,
    pub results: Vec<CanonicalSearchResult>,
    pub total: u64,
    pub query_time_ms: u64,
    pub error_message: Option<String>,
    /// Taxonomy category of the failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

impl BackendResponse {
    pub fn success(
        backend_type: BackendType,
        results: Vec<CanonicalSearchResult>,
        total: u64,
        query_time_ms: u64,
    ) -> Self {
        Self {
            backend_type,
            status: BackendStatus::Available,
            results,
            total,
            query_time_ms,
            error_message: None,
            error_category: None,
        }
    }

    pub fn failure(
        backend_type: BackendType,
        status: BackendStatus,
        message: impl Into<String>,
        query_time_ms: u64,
    ) -> Self {
        Self {
            backend_type,
            status,
            results: Vec::new(),
            total: 0,
            query_time_ms,
            error_message: Some(message.into()),
            error_category: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BackendStatus::Available
    }
}

/// Coerce a JSON size value (number or numeric string) into bytes
pub(crate) fn coerce_size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Extension of the last path segment, lower-cased and without the dot
pub(crate) fn extension_of(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
