//! Error types and the user-facing error taxonomy for search operations

use crate::error::AppError;
use crate::search::result::BackendStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// No active catalog session
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    /// The catalog rejected the request for the current credentials
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Registry URL missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Index pattern could not be built
    #[error("Invalid index pattern: {0}")]
    InvalidIndexPattern(String),

    /// Query syntax rejected by a backend
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Search execution failed
    #[error("Search execution failed: {0}")]
    SearchFailed(String),

    /// Backend response could not be interpreted
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Network failure talking to the catalog
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl SearchError {
    /// Map this error onto the user-facing taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            SearchError::AuthenticationRequired(_) => ErrorCategory::Authentication,
            SearchError::AuthorizationFailed(_) => ErrorCategory::Authorization,
            SearchError::InvalidConfiguration(_) => ErrorCategory::Configuration,
            SearchError::InvalidIndexPattern(_) | SearchError::InvalidQuery(_) => {
                ErrorCategory::InvalidInput
            }
            SearchError::SearchFailed(_) | SearchError::MalformedResponse(_) => {
                ErrorCategory::BackendError
            }
            SearchError::Network(_) => ErrorCategory::Network,
            SearchError::Timeout(_) => ErrorCategory::Timeout,
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::AuthenticationRequired(msg) => AppError::Authentication(msg),
            SearchError::AuthorizationFailed(msg) => AppError::Authorization(msg),
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::InvalidIndexPattern(msg) | SearchError::InvalidQuery(msg) => {
                AppError::Validation(msg)
            }
            SearchError::Network(msg) => AppError::Network(msg),
            SearchError::Timeout(msg) => AppError::Timeout(msg),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

/// Failure categories surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    NotApplicable,
    Configuration,
    BackendError,
    InvalidInput,
    Timeout,
    Network,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::NotApplicable => "not_applicable",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::BackendError => "backend_error",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong, from the caller's point of view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub cause: String,
    pub authenticated: bool,
    pub catalog_url: Option<String>,
}

/// How to fix it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorFix {
    pub required_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// Structured, machine-actionable error payload returned instead of raising
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_category: ErrorCategory,
    pub details: ErrorDetails,
    pub fix: ErrorFix,
    /// Operation name to description of what it offers instead of search
    pub alternatives: BTreeMap<String, String>,
    /// Per-backend status, present when no backend could serve the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_status: Option<BTreeMap<String, BackendStatus>>,
}

const TOKEN_ENV_VAR: &str = "CATALOG_SEARCH__CATALOG__ACCESS_TOKEN";

fn default_alternatives() -> BTreeMap<String, String> {
    let mut alternatives = BTreeMap::new();
    alternatives.insert(
        "bucket_objects_list".to_string(),
        "List objects in a known bucket directly from storage".to_string(),
    );
    alternatives.insert(
        "package_browse".to_string(),
        "Browse a known package by name without searching".to_string(),
    );
    alternatives.insert(
        "catalog_info".to_string(),
        "Inspect the configured catalog and session state".to_string(),
    );
    alternatives
}

impl ErrorResponse {
    fn new(
        category: ErrorCategory,
        error: impl Into<String>,
        details: ErrorDetails,
        fix: ErrorFix,
    ) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_category: category,
            details,
            fix,
            alternatives: default_alternatives(),
            backend_status: None,
        }
    }

    /// No active session
    pub fn authentication_required(catalog_url: Option<String>) -> Self {
        Self::new(
            ErrorCategory::Authentication,
            "Search requires an authenticated catalog session",
            ErrorDetails {
                cause: "No active session with the catalog".to_string(),
                authenticated: false,
                catalog_url,
            },
            ErrorFix {
                required_action: "Provide a catalog access token and retry".to_string(),
                command: Some(format!("export {}=<token>", TOKEN_ENV_VAR)),
                documentation: None,
            },
        )
    }

    /// Authenticated, but no backend can serve the request
    pub fn no_backend_available(
        catalog_url: Option<String>,
        statuses: BTreeMap<String, BackendStatus>,
    ) -> Self {
        let summary = statuses
            .iter()
            .map(|(name, status)| format!("{}={}", name, status))
            .collect::<Vec<_>>()
            .join(", ");

        let mut response = Self::new(
            ErrorCategory::NotApplicable,
            "No search backend is available for this catalog",
            ErrorDetails {
                cause: format!("All backends unavailable ({})", summary),
                authenticated: true,
                catalog_url,
            },
            ErrorFix {
                required_action:
                    "Verify the catalog has search indices enabled, or use a non-search alternative"
                        .to_string(),
                command: None,
                documentation: None,
            },
        );
        response.backend_status = Some(statuses);
        response
    }

    /// Registry URL missing or invalid
    pub fn configuration(cause: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            "Catalog configuration is missing or invalid",
            ErrorDetails {
                cause: cause.into(),
                authenticated: false,
                catalog_url: None,
            },
            ErrorFix {
                required_action: "Set the catalog registry URL".to_string(),
                command: Some("export CATALOG_SEARCH__CATALOG__REGISTRY_URL=<url>".to_string()),
                documentation: None,
            },
        )
    }

    /// Backend failed while executing the search
    pub fn backend_error(
        backend: &str,
        category: ErrorCategory,
        cause: impl Into<String>,
        catalog_url: Option<String>,
    ) -> Self {
        let cause = cause.into();
        match category {
            ErrorCategory::Authentication => {
                let mut response = Self::authentication_required(catalog_url);
                response.details.cause = cause;
                response
            }
            ErrorCategory::Configuration => Self::configuration(cause),
            _ => Self::new(
                category,
                format!("Search backend '{}' failed", backend),
                ErrorDetails {
                    cause,
                    authenticated: true,
                    catalog_url,
                },
                ErrorFix {
                    required_action: required_action(category).to_string(),
                    command: None,
                    documentation: None,
                },
            ),
        }
    }

    /// Build a payload from a typed search error
    pub fn from_error(err: &SearchError, catalog_url: Option<String>) -> Self {
        let category = err.category();
        match category {
            ErrorCategory::Authentication => Self::authentication_required(catalog_url),
            ErrorCategory::Configuration => Self::configuration(err.to_string()),
            _ => Self::new(
                category,
                err.to_string(),
                ErrorDetails {
                    cause: err.to_string(),
                    authenticated: true,
                    catalog_url,
                },
                ErrorFix {
                    required_action: required_action(category).to_string(),
                    command: None,
                    documentation: None,
                },
            ),
        }
    }
}

fn required_action(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Authorization => {
            "Request access to the targeted buckets, or search a single bucket"
        }
        ErrorCategory::InvalidInput => "Simplify the query syntax and retry",
        ErrorCategory::Timeout => "Retry with a narrower scope or a smaller limit",
        ErrorCategory::Network => "Check connectivity to the catalog and retry",
        ErrorCategory::BackendError => "Retry the search, or narrow it to a single bucket",
        _ => "Retry the search",
    }
}
