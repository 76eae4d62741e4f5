//! Unified catalog search
//!
//! A caller issues one free-text query against a data catalog of files and
//! versioned packages stored under named buckets, without knowing which index
//! technology holds the answer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           UnifiedSearch                          │
//! │  parse -> resolve backend -> search -> filter    │
//! └─────────────────────────────────────────────────┘
//!          │                        │
//!          ▼                        ▼
//! ┌──────────────────┐   ┌──────────────────────────┐
//! │  QueryParser     │   │  BackendRegistry          │
//! │  type, filters,  │   │  health per backend,      │
//! │  keywords        │   │  primary selection        │
//! └──────────────────┘   └──────────────────────────┘
//!                                   │
//!                  ┌────────────────┴───────────────┐
//!                  ▼                                ▼
//!   ┌───────────────────────────┐   ┌──────────────────────────┐
//!   │  ElasticsearchBackend     │   │  GraphqlBackend           │
//!   │  index patterns, 403      │   │  searchObjects,           │
//!   │  degradation, scopes      │   │  searchPackages           │
//!   └───────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_unified_search::config::Config;
//! use catalog_unified_search::search::{HttpCatalogClient, SearchRequest, UnifiedSearch};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let client = Arc::new(HttpCatalogClient::new(&config.catalog)?);
//! let search = UnifiedSearch::from_clients(client.clone(), client, &config.search);
//!
//! let outcome = search
//!     .search(&SearchRequest::new("CSV files larger than 100MB").with_limit(10))
//!     .await;
//! println!("{}", outcome.to_json());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod backends;
pub mod catalog;
pub mod error;
pub mod explain;
pub mod registry;
pub mod result;
pub mod scope;
pub mod unified;

pub use analysis::{QueryAnalysis, QueryFilters, QueryParser, QueryScope, QueryType};
pub use backends::{BackendQuery, ElasticsearchBackend, GraphqlBackend, SearchBackend};
pub use catalog::{CatalogError, HttpCatalogClient, SearchTransport, SessionProvider};
pub use error::{ErrorCategory, ErrorResponse, SearchError, SearchResult};
pub use explain::{QueryComplexity, QueryExplanation};
pub use registry::{BackendHealth, BackendRegistry};
pub use result::{BackendResponse, BackendStatus, BackendType, CanonicalSearchResult, ResultType};
pub use scope::{ScopeHandler, SearchScope};
pub use unified::{
    post_filter, BackendFailure, CountResponse, SearchOutcome, SearchRequest, UnifiedSearch,
    UnifiedSearchResponse,
};
