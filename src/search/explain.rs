//! Natural-language explanation of how a query was interpreted and routed

use crate::search::analysis::{QueryAnalysis, QueryScope, QueryType};
use crate::search::result::BackendType;
use serde::{Deserialize, Serialize};

const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

impl QueryComplexity {
    /// One point per keyword, extracted filter and narrowing target
    pub fn estimate(analysis: &QueryAnalysis) -> Self {
        let score = analysis.keywords.len()
            + analysis.filters.len()
            + usize::from(analysis.target.is_some());
        match score {
            0..=2 => QueryComplexity::Simple,
            3..=5 => QueryComplexity::Moderate,
            _ => QueryComplexity::Complex,
        }
    }
}

/// Why a backend was (or was not) chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSelection {
    pub selected: Option<BackendType>,
    pub reason: String,
    pub suggested: Vec<BackendType>,
    pub available: Vec<BackendType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExplanation {
    pub query_type: QueryType,
    pub interpretation: String,
    pub backend_selection: BackendSelection,
    pub complexity: QueryComplexity,
    pub filters_applied: Vec<String>,
    pub confidence: f64,
    pub alternatives: Vec<String>,
}

fn interpretation(analysis: &QueryAnalysis) -> String {
    let subject = match analysis.query_type {
        QueryType::FileSearch => "files",
        QueryType::PackageDiscovery => "packages",
        QueryType::ContentSearch => "documents by their content",
        QueryType::MetadataSearch => "objects by their metadata",
        QueryType::AnalyticalSearch => "objects to compare or aggregate",
        QueryType::CrossCatalog => "matches across catalogs",
    };

    let mut text = format!("Looking for {}", subject);
    if !analysis.keywords.is_empty() {
        text.push_str(&format!(" matching {}", analysis.keywords.join(", ")));
    }
    match (&analysis.scope, &analysis.target) {
        (QueryScope::Global | QueryScope::Registry, _) | (_, None) => {}
        (scope, Some(target)) => text.push_str(&format!(" within {} '{}'", scope.as_str(), target)),
    }
    text
}

fn describe_filters(analysis: &QueryAnalysis) -> Vec<String> {
    let filters = &analysis.filters;
    let mut described = Vec::new();

    if !filters.file_extensions.is_empty() {
        described.push(format!("extension in [{}]", filters.file_extensions.join(", ")));
    }
    match (filters.size_min, filters.size_max) {
        (Some(min), Some(max)) => described.push(format!("size between {} and {} bytes", min, max)),
        (Some(min), None) => described.push(format!("size at least {} bytes", min)),
        (None, Some(max)) => described.push(format!("size at most {} bytes", max)),
        (None, None) => {}
    }
    if let Some(after) = &filters.created_after {
        described.push(format!("modified after {}", after));
    }
    if let Some(before) = &filters.created_before {
        described.push(format!("modified before {}", before));
    }
    described
}

fn selection_reason(selected: Option<BackendType>, explicit: bool, available: &[BackendType]) -> String {
    match (selected, explicit) {
        (Some(backend), true) => format!("{} was requested explicitly", backend),
        (Some(backend), false) => format!(
            "{} is the first available backend in registration order",
            backend
        ),
        (None, true) => "The requested backend is not available".to_string(),
        (None, false) if available.is_empty() => "No backend is currently available".to_string(),
        (None, false) => "No backend was selected".to_string(),
    }
}

fn alternatives(analysis: &QueryAnalysis) -> Vec<String> {
    let mut suggestions = Vec::new();
    let lead = analysis
        .keywords
        .first()
        .cloned()
        .unwrap_or_else(|| "data".to_string());

    match analysis.query_type {
        QueryType::FileSearch | QueryType::ContentSearch => {
            suggestions.push(format!("packages about {}", lead));
        }
        QueryType::PackageDiscovery => {
            suggestions.push(format!("{} files", lead));
        }
        _ => {}
    }
    if analysis.filters.file_extensions.is_empty() && analysis.query_type == QueryType::FileSearch {
        suggestions.push(format!("{} csv files", lead));
    }
    if analysis.keywords.len() > 3 {
        suggestions.push(analysis.keywords[..2].join(" "));
    }
    if analysis.target.is_none() {
        suggestions.push(format!("{} (scope: bucket, with a target bucket)", lead));
    }

    suggestions.truncate(MAX_ALTERNATIVES);
    suggestions
}

/// Explain how `analysis` was routed
pub fn explain(
    analysis: &QueryAnalysis,
    selected: Option<BackendType>,
    explicit: bool,
    available: &[BackendType],
) -> QueryExplanation {
    QueryExplanation {
        query_type: analysis.query_type,
        interpretation: interpretation(analysis),
        backend_selection: BackendSelection {
            selected,
            reason: selection_reason(selected, explicit, available),
            suggested: analysis.suggested_backends.clone(),
            available: available.to_vec(),
        },
        complexity: QueryComplexity::estimate(analysis),
        filters_applied: describe_filters(analysis),
        confidence: analysis.confidence,
        alternatives: alternatives(analysis),
    }
}
