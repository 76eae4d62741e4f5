//! Free-text query analysis
//!
//! Turns a raw query string into a [`QueryAnalysis`]: a classification, the
//! requested scope, extracted filters and keywords, a confidence estimate and an
//! advisory list of backends. Analysis never fails; unrecognised input degrades to
//! a low-confidence `file_search` over the global scope.

use crate::search::result::BackendType;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What the caller is most likely looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    FileSearch,
    PackageDiscovery,
    ContentSearch,
    MetadataSearch,
    AnalyticalSearch,
    CrossCatalog,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::FileSearch => "file_search",
            QueryType::PackageDiscovery => "package_discovery",
            QueryType::ContentSearch => "content_search",
            QueryType::MetadataSearch => "metadata_search",
            QueryType::AnalyticalSearch => "analytical_search",
            QueryType::CrossCatalog => "cross_catalog",
        }
    }

    /// Advisory backend ordering for this kind of query
    pub fn suggested_backends(&self) -> Vec<BackendType> {
        use BackendType::*;
        match self {
            QueryType::FileSearch => vec![Elasticsearch, Graphql, S3],
            QueryType::PackageDiscovery => vec![Graphql, Elasticsearch],
            QueryType::ContentSearch => vec![Elasticsearch, S3],
            QueryType::MetadataSearch => vec![Graphql, Elasticsearch],
            QueryType::AnalyticalSearch => vec![Graphql, Elasticsearch],
            QueryType::CrossCatalog => vec![Elasticsearch, Graphql],
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breadth of the request as stated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    #[default]
    Global,
    Catalog,
    Package,
    Bucket,
    Registry,
}

impl QueryScope {
    /// Parse a scope name, falling back to `Global` for anything unknown
    pub fn parse(scope: &str) -> Self {
        match scope.trim().to_ascii_lowercase().as_str() {
            "catalog" => QueryScope::Catalog,
            "package" => QueryScope::Package,
            "bucket" => QueryScope::Bucket,
            "registry" => QueryScope::Registry,
            _ => QueryScope::Global,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryScope::Global => "global",
            QueryScope::Catalog => "catalog",
            QueryScope::Package => "package",
            QueryScope::Bucket => "bucket",
            QueryScope::Registry => "registry",
        }
    }
}

/// Filters extracted from the query text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Extensions without the leading dot, lower-cased
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_extensions: Vec<String>,

    /// Minimum size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_min: Option<u64>,

    /// Maximum size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_max: Option<u64>,

    /// Lower date bound, either `now-<n>d` or a literal date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<String>,

    /// Upper date bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<String>,
}

impl QueryFilters {
    /// Number of filter entries that are set
    pub fn len(&self) -> usize {
        usize::from(!self.file_extensions.is_empty())
            + usize::from(self.size_min.is_some())
            + usize::from(self.size_max.is_some())
            + usize::from(self.created_after.is_some())
            + usize::from(self.created_before.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Structured intent derived from one query; never mutated after parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub scope: QueryScope,
    pub target: Option<String>,
    pub filters: QueryFilters,
    pub keywords: Vec<String>,
    pub confidence: f64,
    /// Advisory ordering; backend selection does not consult it
    pub suggested_backends: Vec<BackendType>,
}

const EXTENSION_ALTERNATION: &str =
    "csv|tsv|json|jsonl|parquet|txt|xlsx?|h5|hdf5|zarr|bam|sam|vcf|fastq|fq|tiff?|png|jpe?g|pdf|ipynb";

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("query pattern"))
        .collect()
}

static FILE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let known_ext = format!(r"\b({})\b", EXTENSION_ALTERNATION);
    let ext_files = format!(r"\b({})\s+files?\b", EXTENSION_ALTERNATION);
    compile(&[
        r"\bfiles?\b",
        known_ext.as_str(),
        r"\*\.\w+",
        r"(?:^|\s)\.[a-z][a-z0-9]{0,4}\b",
        r"\b(extension|file\s+type|format)\b",
        ext_files.as_str(),
    ])
});

static PACKAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bpackages?\b",
        r"\b(datasets?|collections?)\b",
        r"\b(namespace|registry|manifests?|versions?)\b",
        r"\b(find|search|list|show|browse)\s+(all\s+)?(packages?|datasets?)\b",
        r"\b[a-z0-9_-]+/[a-z0-9_-]+\b",
    ])
});

static CONTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\b(contains?|containing)\b",
        r"\b(mentions?|mentioning)\b",
        r"\babout\b",
        r"\b(related\s+to|regarding|discuss(es|ing)?)\b",
        r#""[^"]+""#,
    ])
});

static METADATA_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\b(created|modified|updated|uploaded)\b",
        r"\b(author|owner|user|tag(ged)?|metadata)\b",
        r"\b(larger|bigger|greater|smaller|less)\s+than\b",
        r"\b\d+(\.\d+)?\s*(b|kb|mb|gb|tb)\b",
        r"\b(before|after|since|between|last|past)\b",
    ])
});

static ANALYTICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\b(largest|smallest|biggest)\b",
        r"\b(count|how\s+many|number\s+of)\b",
        r"\b(total|sum|average|mean)\b",
        r"\b(statistics|stats|summary|summarize|distribution|aggregate|analy[sz]e)\b",
        r"\b(top|most|least)\s+\d*",
    ])
});

const ANALYTICAL_BOOST_TERMS: &[&str] = &[
    "largest", "smallest", "count", "total", "analyze", "bigger", "larger", "smaller",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "were", "find",
    "search", "show", "get", "list", "all", "any", "some", "files", "file", "than", "about",
    "into", "what", "which", "where", "who", "how", "can", "you", "please", "give", "look",
    "looking", "have", "has", "had", "their", "there", "them", "they", "only", "just",
    "like", "also", "been", "being", "does", "did", "our", "your", "its", "over", "under",
];

const EXTENSION_NOISE: &[&str] = &["data", "files", "file", "with", "extension", "format", "type"];

static HYPHENATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9]+(?:-[a-z0-9]+)+").expect("hyphenated regex"));
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("word regex"));

static EXTENSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\*\.([a-z0-9]+)\b",
        r"\.([a-z0-9]+)\s+files?\b",
        r"\b([a-z0-9]+)\s+files?\b",
        r"\bfiles?\s+with\s+\.?([a-z0-9]+)\s+extension\b",
        r"\b([a-z0-9]+)\s+file\s+type\b",
    ])
});
static EXTENSION_CONJUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.?\b([a-z0-9]+)\s+and\s+\.?([a-z0-9]+)\s+files?\b")
        .expect("extension conjunction regex")
});

const SIZE_NUMBER: &str = r"(\d+(?:\.\d+)?)\s*(b|kb|mb|gb|tb)";

static SIZE_LARGER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(?:larger|bigger|greater|more)\s+than\s+{}\b", SIZE_NUMBER))
        .expect("size lower bound regex")
});
static SIZE_SMALLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(?:smaller|less)\s+than\s+{}\b", SIZE_NUMBER))
        .expect("size upper bound regex")
});
static SIZE_BETWEEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bbetween\s+(\d+(?:\.\d+)?)\s*(b|kb|mb|gb|tb)?\s+and\s+(\d+(?:\.\d+)?)\s*(b|kb|mb|gb|tb)\b")
        .expect("size range regex")
});

static LAST_DAYS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:last|past)\s+(\d+)\s+days?\b").expect("days regex"));
static LAST_WEEKS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:last|past)\s+(\d+)\s+weeks?\b").expect("weeks regex"));
static LAST_MONTHS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:last|past)\s+(\d+)\s+months?\b").expect("months regex"));
static CREATED_IN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcreated\s+in\s+(\d{4})\b").expect("created-in regex"));
static SINCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsince\s+(\d{4}-\d{2}-\d{2})\b").expect("since regex"));

/// Bytes per unit suffix
fn unit_multiplier(unit: &str) -> u64 {
    match unit {
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        "tb" => 1024 * 1024 * 1024 * 1024,
        _ => 1,
    }
}

fn to_bytes(number: &str, unit: &str) -> Option<u64> {
    let value: f64 = number.parse().ok()?;
    Some((value * unit_multiplier(unit) as f64) as u64)
}

/// Stateless query parser
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

impl QueryParser {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a query. Never fails.
    pub fn parse(&self, query: &str, scope: &str, target: &str) -> QueryAnalysis {
        let lowered = query.to_lowercase();

        let query_type = self.classify(&lowered);
        let keywords = self.extract_keywords(&lowered);
        let filters = self.extract_filters(&lowered);
        let confidence = Self::confidence(keywords.len(), filters.len());

        let target = target.trim();
        let analysis = QueryAnalysis {
            query_type,
            scope: QueryScope::parse(scope),
            target: (!target.is_empty()).then(|| target.to_string()),
            filters,
            keywords,
            confidence,
            suggested_backends: query_type.suggested_backends(),
        };

        tracing::debug!(
            query_type = %analysis.query_type,
            scope = analysis.scope.as_str(),
            keywords = analysis.keywords.len(),
            filters = analysis.filters.len(),
            confidence = analysis.confidence,
            "Query analyzed"
        );

        analysis
    }

    /// Score each pattern family and pick the highest; ties go to the earlier family
    pub fn classify(&self, lowered: &str) -> QueryType {
        let families: [(QueryType, &Vec<Regex>); 5] = [
            (QueryType::FileSearch, &*FILE_PATTERNS),
            (QueryType::PackageDiscovery, &*PACKAGE_PATTERNS),
            (QueryType::ContentSearch, &*CONTENT_PATTERNS),
            (QueryType::MetadataSearch, &*METADATA_PATTERNS),
            (QueryType::AnalyticalSearch, &*ANALYTICAL_PATTERNS),
        ];

        let mut scores: Vec<(QueryType, u32)> = families
            .iter()
            .map(|(query_type, patterns)| {
                let score = patterns.iter().filter(|re| re.is_match(lowered)).count() as u32;
                (*query_type, score)
            })
            .collect();

        let words: Vec<&str> = WORD_RE.find_iter(lowered).map(|m| m.as_str()).collect();

        if words.iter().filter(|w| **w == "packages").count() >= 2 {
            Self::boost(&mut scores, QueryType::PackageDiscovery, 2);
        }
        if words.iter().any(|w| ANALYTICAL_BOOST_TERMS.contains(w)) {
            Self::boost(&mut scores, QueryType::AnalyticalSearch, 2);
        }

        let mut best = (QueryType::FileSearch, 0);
        for (query_type, score) in scores {
            if score > best.1 {
                best = (query_type, score);
            }
        }
        best.0
    }

    fn boost(scores: &mut [(QueryType, u32)], target: QueryType, amount: u32) {
        if let Some(entry) = scores.iter_mut().find(|(t, _)| *t == target) {
            entry.1 += amount;
        }
    }

    /// Hyphenated compounds first, then plain words; stop-words and short words dropped
    pub fn extract_keywords(&self, lowered: &str) -> Vec<String> {
        let mut candidates: Vec<String> = HYPHENATED_RE
            .find_iter(lowered)
            .map(|m| m.as_str().to_string())
            .collect();

        let remainder = HYPHENATED_RE.replace_all(lowered, " ");
        candidates.extend(WORD_RE.find_iter(&remainder).map(|m| m.as_str().to_string()));

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
            .filter(|w| seen.insert(w.clone()))
            .collect()
    }

    pub fn extract_filters(&self, lowered: &str) -> QueryFilters {
        let mut filters = QueryFilters {
            file_extensions: self.extract_extensions(lowered),
            ..Default::default()
        };
        self.extract_size(lowered, &mut filters);
        self.extract_dates(lowered, &mut filters);
        filters
    }

    fn extract_extensions(&self, lowered: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        for caps in EXTENSION_CONJUNCTION_RE.captures_iter(lowered) {
            candidates.push(caps[1].to_string());
            candidates.push(caps[2].to_string());
        }
        for re in EXTENSION_PATTERNS.iter() {
            for caps in re.captures_iter(lowered) {
                candidates.push(caps[1].to_string());
            }
        }

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|ext| {
                ext.len() <= 5
                    && !EXTENSION_NOISE.contains(&ext.as_str())
                    && !STOP_WORDS.contains(&ext.as_str())
                    && !ext.chars().all(|c| c.is_ascii_digit())
            })
            .filter(|ext| seen.insert(ext.clone()))
            .collect()
    }

    fn extract_size(&self, lowered: &str, filters: &mut QueryFilters) {
        if let Some(caps) = SIZE_BETWEEN_RE.captures(lowered) {
            let upper_unit = &caps[4];
            let lower_unit = caps.get(2).map(|m| m.as_str()).unwrap_or(upper_unit);
            filters.size_min = to_bytes(&caps[1], lower_unit);
            filters.size_max = to_bytes(&caps[3], upper_unit);
            return;
        }
        if let Some(caps) = SIZE_LARGER_RE.captures(lowered) {
            filters.size_min = to_bytes(&caps[1], &caps[2]);
        }
        if let Some(caps) = SIZE_SMALLER_RE.captures(lowered) {
            filters.size_max = to_bytes(&caps[1], &caps[2]);
        }
    }

    fn extract_dates(&self, lowered: &str, filters: &mut QueryFilters) {
        let relative = [(&*LAST_DAYS_RE, 1u64), (&*LAST_WEEKS_RE, 7), (&*LAST_MONTHS_RE, 30)];
        for (re, days_per_unit) in relative {
            if let Some(count) = re.captures(lowered).and_then(|c| c[1].parse::<u64>().ok()) {
                filters.created_after = Some(format!("now-{}d", count * days_per_unit));
            }
        }

        if let Some(caps) = CREATED_IN_RE.captures(lowered) {
            let year = &caps[1];
            filters.created_after = Some(format!("{}-01-01", year));
            filters.created_before = Some(format!("{}-12-31", year));
        }

        if let Some(caps) = SINCE_RE.captures(lowered) {
            let date = &caps[1];
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok() {
                filters.created_after = Some(date.to_string());
            }
        }
    }

    fn confidence(keyword_count: usize, filter_count: usize) -> f64 {
        let keyword_bonus = (0.1 * keyword_count as f64).min(0.3);
        let filter_bonus = (0.1 * filter_count as f64).min(0.2);
        (0.5 + keyword_bonus + filter_bonus).min(1.0)
    }
}
