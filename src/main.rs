use anyhow::Context;
use catalog_unified_search::config::{Config, ObservabilityConfig};
use catalog_unified_search::search::{
    ErrorCategory, ErrorResponse, HttpCatalogClient, SearchOutcome, SearchRequest, UnifiedSearch,
};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "catalog-search", version)]
#[command(about = "Search a data catalog's files and packages", long_about = None)]
struct Cli {
    /// Free-text query
    #[arg(value_name = "QUERY", required_unless_present = "status")]
    query: Option<String>,

    /// global, file, packageEntry, catalog, package, bucket or registry
    #[arg(short, long, default_value = "global")]
    scope: String,

    /// Bucket or package the scope narrows to
    #[arg(short, long, default_value = "")]
    target: String,

    /// auto, elasticsearch or graphql
    #[arg(short, long, default_value = "auto")]
    backend: String,

    /// Maximum number of results (defaults to search.default_limit)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Keep backend-native metadata and the query analysis in the output
    #[arg(long)]
    include_metadata: bool,

    /// Explain how the query was interpreted and routed
    #[arg(long)]
    explain: bool,

    /// Only report the number of matches
    #[arg(long)]
    count_only: bool,

    /// Print backend health instead of searching
    #[arg(long)]
    status: bool,

    /// Configuration file
    #[arg(short, long, env = "CATALOG_SEARCH_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("catalog_unified_search={}", observability.log_level).into()
    });

    // stdout carries the JSON payload
    let json = observability.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

fn exit_code(outcome: &SearchOutcome) -> ExitCode {
    let category = match outcome {
        SearchOutcome::Failure(error) => error.error_category,
        SearchOutcome::Success(response) => match &response.failure {
            Some(failure) => failure.error_category,
            None => return ExitCode::SUCCESS,
        },
        SearchOutcome::Count(_) => return ExitCode::SUCCESS,
    };

    match category {
        ErrorCategory::Authentication | ErrorCategory::Authorization => ExitCode::from(3),
        ErrorCategory::Configuration | ErrorCategory::InvalidInput => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_json(&ErrorResponse::configuration(e.to_string()))?;
            return Ok(ExitCode::from(e.exit_code() as u8));
        }
    };

    init_tracing(&config.observability);
    tracing::debug!("Starting catalog-search v{}", env!("CARGO_PKG_VERSION"));

    let client = Arc::new(
        HttpCatalogClient::new(&config.catalog).context("failed to create catalog client")?,
    );
    let search = UnifiedSearch::from_clients(client.clone(), client, &config.search);

    if cli.status {
        print_json(&search.status().await)?;
        return Ok(ExitCode::SUCCESS);
    }

    let request = SearchRequest::new(cli.query.unwrap_or_default())
        .with_scope(cli.scope)
        .with_target(cli.target)
        .with_backend(cli.backend)
        .with_limit(cli.limit.unwrap_or(config.search.default_limit))
        .with_metadata(cli.include_metadata)
        .with_explanation(cli.explain)
        .with_count_only(cli.count_only);

    let outcome = search.search(&request).await;
    print_json(&outcome)?;
    Ok(exit_code(&outcome))
}
