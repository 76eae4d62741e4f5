use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "CATALOG_SEARCH_CONFIG";

/// Bare environment variable honoured when `search.default_bucket` is unset
pub const DEFAULT_BUCKET_ENV: &str = "DEFAULT_BUCKET";

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Catalog connection settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Search behaviour
    #[serde(default)]
    pub search: SearchSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and the environment
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load configuration, layering `path` (if any) over the embedded defaults
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Toml,
            ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Config = builder
            // Override with environment variables (prefix: CATALOG_SEARCH_)
            .add_source(
                config::Environment::with_prefix("CATALOG_SEARCH")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("search.bucket_retry_steps"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the search core cannot work with
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.catalog.registry_url() {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                AppError::Configuration(format!("Invalid registry URL '{}': {}", url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Configuration(format!(
                    "Registry URL must use http or https: {}",
                    url
                )));
            }
        }

        if self.search.bucket_retry_steps.is_empty() {
            return Err(AppError::Configuration(
                "search.bucket_retry_steps must not be empty".to_string(),
            ));
        }

        if self.search.default_limit == 0 {
            return Err(AppError::Configuration(
                "search.default_limit must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Registry (API) URL of the catalog
    #[serde(default)]
    pub registry_url: Option<String>,

    /// Bearer token for the catalog session
    #[serde(default)]
    pub access_token: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl CatalogConfig {
    /// Registry URL, treating an empty string as unset
    pub fn registry_url(&self) -> Option<&str> {
        self.registry_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Access token, treating an empty string as unset
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            access_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Bucket moved to the front of the bucket list
    #[serde(default)]
    pub default_bucket: Option<String>,

    /// Result limit when the caller gives none
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Bucket counts tried, in order, after an authorization failure
    #[serde(default = "default_bucket_retry_steps")]
    pub bucket_retry_steps: Vec<usize>,

    /// Collapse package-scope hits sharing this field (e.g. `ptr_name`)
    #[serde(default)]
    pub package_collapse_field: Option<String>,
}

impl SearchSettings {
    /// Configured default bucket, falling back to `DEFAULT_BUCKET`
    pub fn default_bucket(&self) -> Option<String> {
        self.default_bucket
            .clone()
            .filter(|bucket| !bucket.trim().is_empty())
            .or_else(|| {
                std::env::var(DEFAULT_BUCKET_ENV)
                    .ok()
                    .filter(|bucket| !bucket.trim().is_empty())
            })
    }

    /// Configured collapse field, treating an empty string as unset
    pub fn package_collapse_field(&self) -> Option<String> {
        self.package_collapse_field
            .as_deref()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_bucket: None,
            default_limit: default_limit(),
            bucket_retry_steps: default_bucket_retry_steps(),
            package_collapse_field: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_limit() -> usize {
    50
}

fn default_bucket_retry_steps() -> Vec<usize> {
    vec![50, 40, 30, 20, 10]
}

fn default_log_level() -> String {
    "info".to_string()
}
