use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use rerankbench_rs::{
    geometric_levels, run_benchmark, BenchmarkConfig, BenchmarkError, BenchmarkReport,
    FailurePolicy, HttpEndpoint, PayloadFormat, RerankRequest,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_QUERY: &str = "What is the capital of France?";
const DEFAULT_DOCUMENTS: [&str; 4] = [
    "Paris is the capital and most populous city of France.",
    "Berlin is the capital of Germany.",
    "The Eiffel Tower was completed in 1889.",
    "France is a country in Western Europe.",
];

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    /// {"pairs": [[query, doc], ...]}
    Pairs,
    /// {"inputs": [{"text": query, "text_pair": doc}, ...]}
    TextPairs,
    /// {"query": query, "texts": [...]}
    Rerank,
}

impl From<FormatArg> for PayloadFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pairs => PayloadFormat::Pairs,
            FormatArg::TextPairs => PayloadFormat::TextPairs,
            FormatArg::Rerank => PayloadFormat::Rerank,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnFailureArg {
    /// Stop the run at the first failed request
    Abort,
    /// Record failed requests and leave them out of the averages
    Exclude,
}

impl From<OnFailureArg> for FailurePolicy {
    fn from(value: OnFailureArg) -> Self {
        match value {
            OnFailureArg::Abort => FailurePolicy::Abort,
            OnFailureArg::Exclude => FailurePolicy::Exclude,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rerankbench",
    about = "Sweep concurrency levels against a reranking endpoint and report latency and throughput"
)]
struct Args {
    /// Full endpoint URL; overrides --host and --endpoint
    #[arg(long)]
    url: Option<String>,

    /// Host to target (e.g. http://localhost:8080)
    #[arg(long, default_value = "http://localhost:8080")]
    host: String,

    /// Endpoint path (e.g. /rerank)
    #[arg(long, default_value = "/rerank")]
    endpoint: String,

    /// API key to use; if omitted an environment variable is read
    #[arg(long)]
    api_key: Option<String>,

    /// Environment variable name to read the API key from when --api-key is not supplied
    #[arg(long, default_value = "RERANK_API_KEY")]
    api_key_env: String,

    /// Extra request header as `Name: value` (repeatable)
    #[arg(long = "header")]
    headers: Vec<String>,

    /// Request body shape expected by the serving backend
    #[arg(long, value_enum, default_value_t = FormatArg::Rerank)]
    format: FormatArg,

    /// Query text to rerank documents against
    #[arg(long)]
    query: Option<String>,

    /// Candidate document (repeatable)
    #[arg(long = "document")]
    documents: Vec<String>,

    /// JSON file with `query` and `documents` fields; overrides --query and --document
    #[arg(long)]
    request_file: Option<PathBuf>,

    /// Comma separated concurrency levels, tested in the given order
    #[arg(long, value_delimiter = ',')]
    concurrency: Option<Vec<usize>>,

    /// Test powers of two up to this level when --concurrency is not supplied
    #[arg(long, default_value_t = 32)]
    max_concurrency: usize,

    /// Trials per concurrency level
    #[arg(long, default_value_t = 5)]
    trials: usize,

    /// Unmeasured requests sent before the sweep starts
    #[arg(long, default_value_t = 1)]
    warmup: usize,

    /// What to do when a request fails
    #[arg(long, value_enum, default_value_t = OnFailureArg::Abort)]
    on_failure: OnFailureArg,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    request_timeout_secs: u64,

    /// Write the report as JSON to this path
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Write the report as CSV to this path
    #[arg(long)]
    csv_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.request_timeout_secs == 0 {
        return Err(anyhow!("request-timeout-secs must be greater than zero"));
    }

    let request = build_request(&args)?;
    let payload = request.to_payload(args.format.into())?;

    let levels = args
        .concurrency
        .clone()
        .unwrap_or_else(|| geometric_levels(args.max_concurrency));
    let config = BenchmarkConfig::try_new(levels, args.trials, payload)?
        .with_failure_policy(args.on_failure.into())
        .with_warmup(args.warmup);

    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var(&args.api_key_env).ok());
    let url = args
        .url
        .clone()
        .unwrap_or_else(|| resolve_endpoint(&args.host, &args.endpoint));

    let mut endpoint = HttpEndpoint::try_new(
        &url,
        api_key,
        Duration::from_secs(args.request_timeout_secs),
    )?;
    for raw in &args.headers {
        endpoint = endpoint.add_raw_header(raw)?;
    }

    tracing::info!(
        url = %endpoint.url(),
        levels = ?config.concurrency_levels,
        trials = config.trials_per_level,
        planned_requests = config.planned_requests(),
        "starting benchmark"
    );

    let report = match run_benchmark(Arc::new(endpoint), &config).await {
        Ok(report) => report,
        Err(BenchmarkError::Aborted(aborted)) => {
            if !aborted.partial.levels.is_empty() {
                println!("Completed levels before the failure:");
                print_summary(&aborted.partial);
            }
            return Err(BenchmarkError::Aborted(aborted).into());
        }
        Err(err) => return Err(err.into()),
    };

    print_summary(&report);
    write_outputs(&args, &report)?;

    Ok(())
}

fn build_request(args: &Args) -> Result<RerankRequest> {
    if let Some(path) = &args.request_file {
        return RerankRequest::from_json_file(path)
            .with_context(|| format!("failed to load request from {}", path.display()));
    }

    let query = args
        .query
        .clone()
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());
    let documents = if args.documents.is_empty() {
        DEFAULT_DOCUMENTS.iter().map(|doc| doc.to_string()).collect()
    } else {
        args.documents.clone()
    };

    Ok(RerankRequest::new(query, documents))
}

fn resolve_endpoint(host: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }

    let normalized_host = if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    };

    format!("{}/{}", normalized_host, endpoint.trim_start_matches('/'))
}

fn print_summary(report: &BenchmarkReport) {
    print!("{}", report.render_table());
    println!(
        "Total requests: {} (failed {}) in {:.2}s",
        report.total_requests(),
        report.failed_requests(),
        report.total_duration.as_secs_f64()
    );

    for level in &report.levels {
        for failure in &level.failures {
            println!(
                "  concurrency {} trial {} worker {}: {}",
                failure.concurrency, failure.trial, failure.worker, failure.error
            );
        }
    }
}

fn write_outputs(args: &Args, report: &BenchmarkReport) -> Result<()> {
    if let Some(path) = &args.json_out {
        let body = serde_json::to_string_pretty(&report.to_json())?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write JSON report {}", path.display()))?;
    }

    if let Some(path) = &args.csv_out {
        std::fs::write(path, report.to_csv())
            .with_context(|| format!("failed to write CSV report {}", path.display()))?;
    }

    Ok(())
}
