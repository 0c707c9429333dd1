use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use kpi_pulse::config::{
    PipelineConfig, GA_ACCESS_TOKEN, GA_PROPERTY_ID, KPI_WINDOW_DAYS, OPENAI_API_KEY, STRIPE_API_KEY, TW_BEARER_TOKEN,
};
use kpi_pulse::ingestion::{AnalyticsFeed, CsvFeed, FeedAdapter, PaymentsFeed};
use kpi_pulse::insight::summary::{SUMMARY_METRICS, TREND_WINDOW};
use kpi_pulse::insight::{classify_trend, parse_response, summarize};
use kpi_pulse::llm::LlmClient;
use kpi_pulse::snapshot::read_kpi_snapshot;
use kpi_pulse::social::XPoster;
use kpi_pulse::telemetry::init_tracing;
use kpi_pulse::{Backend, DatamartBuilder, Pipeline, SnapshotStore};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "kpi-pulse")]
#[command(about = "Daily KPI datamart with generated insights")]
#[command(version)]
struct Args {
    /// Output directory (or set KPI_OUTPUT_DIR)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch feeds, build the datamart, generate insights and post
    Run {
        /// Days in the reporting window (or set KPI_WINDOW_DAYS)
        #[arg(short, long)]
        days: Option<u32>,

        /// Tabular backend used to build the datamart
        #[arg(long, value_enum, default_value_t = Backend::Simple)]
        backend: Backend,

        /// Replay an exported analytics CSV instead of calling GA4
        #[arg(long)]
        analytics_csv: Option<PathBuf>,

        /// Replay an exported payments CSV instead of calling Stripe
        #[arg(long)]
        payments_csv: Option<PathBuf>,

        /// Skip the social post even when a token is configured
        #[arg(long)]
        no_post: bool,
    },
    /// Build the KPI snapshot from exported feed CSV files
    Build {
        /// Analytics feed CSV (date, sessions, newUsers, totalRevenue, transactions)
        #[arg(long)]
        analytics: PathBuf,

        /// Payments feed CSV (date, gross_revenue)
        #[arg(long)]
        payments: PathBuf,

        #[arg(long, value_enum, default_value_t = Backend::Simple)]
        backend: Backend,
    },
    /// Print trend summaries for a KPI snapshot
    Summarize {
        /// KPI snapshot (default: <output>/kpi_daily.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Parse a saved generated response and write the insights snapshot
    Parse {
        /// Text file with the raw generated response
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Show which credentials are configured
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides: Vec<(&str, String)> = match &args.command {
        Commands::Run { days: Some(days), .. } => vec![(KPI_WINDOW_DAYS, (*days).max(1).to_string())],
        _ => Vec::new(),
    };
    let mut config = PipelineConfig::from_env_with(&overrides).context("Failed to load configuration")?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let log_dir = config.output_dir.join("logs");
    let _guard = init_tracing(Some(log_dir.as_path()));

    let outcome = match args.command {
        Commands::Run { backend, analytics_csv, payments_csv, no_post, .. } => {
            run_pipeline(&config, backend, analytics_csv, payments_csv, no_post).await
        }
        Commands::Build { analytics, payments, backend } => build_snapshot(&config, analytics, payments, backend),
        Commands::Summarize { input } => summarize_snapshot(&config, input),
        Commands::Parse { input } => parse_saved_response(&config, input),
        Commands::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

async fn run_pipeline(
    config: &PipelineConfig,
    backend: Backend,
    analytics_csv: Option<PathBuf>,
    payments_csv: Option<PathBuf>,
    no_post: bool,
) -> Result<()> {
    let analytics: Box<dyn FeedAdapter> = match analytics_csv {
        Some(path) => Box::new(CsvFeed::new("analytics", path)),
        None => Box::new(AnalyticsFeed::new(
            config.require(GA_PROPERTY_ID)?.to_string(),
            config.require(GA_ACCESS_TOKEN)?.to_string(),
        )),
    };
    let payments: Box<dyn FeedAdapter> = match payments_csv {
        Some(path) => Box::new(CsvFeed::new("payments", path)),
        None => Box::new(PaymentsFeed::new(config.require(STRIPE_API_KEY)?.to_string())),
    };

    let mut pipeline = Pipeline::new(analytics, payments, SnapshotStore::new(&config.output_dir))
        .with_backend(backend)
        .with_window_days(config.window_days);

    match &config.openai_api_key {
        Some(key) => {
            let client = LlmClient::new(
                key.clone(),
                config.openai_model.clone(),
                config.openai_base_url.clone(),
                config.llm_timeout,
            )?;
            pipeline = pipeline.with_generator(Box::new(client));
        }
        None => warn!("{} is not configured; insights will use the fallback report", OPENAI_API_KEY),
    }

    match (&config.twitter_bearer_token, no_post) {
        (Some(token), false) => pipeline = pipeline.with_publisher(Box::new(XPoster::new(token.clone()))),
        (_, true) => info!("Social posting disabled by --no-post"),
        (None, false) => info!("{} is not configured; social posting disabled", TW_BEARER_TOKEN),
    }

    let report = pipeline.run(Local::now().date_naive()).await?;

    println!("\n=== KPI Pipeline ===");
    println!("Window:        {} to {}", report.window.start, report.window.end);
    println!("KPI rows:      {} ({})", report.kpi_rows.len(), report.kpi_path.display());
    println!("Action items:  {}", report.insights.action_items.len());
    for item in &report.insights.action_items {
        println!("  [{}] {} -> {}", item.priority, item.issue, item.recommended_action);
    }
    if !report.insights_saved {
        println!("Insights were not generated; the previous snapshot was kept.");
    }
    if let Some(posted) = report.posted {
        println!("Social post:   {}", if posted { "sent" } else { "failed" });
    }
    Ok(())
}

fn build_snapshot(config: &PipelineConfig, analytics: PathBuf, payments: PathBuf, backend: Backend) -> Result<()> {
    let rows = DatamartBuilder::new().build_csv(backend, &analytics, &payments)?;
    let store = SnapshotStore::new(&config.output_dir);
    let path = store.write_kpi(&rows)?;
    println!("Wrote {} KPI rows to {}", rows.len(), path.display());
    Ok(())
}

fn summarize_snapshot(config: &PipelineConfig, input: Option<PathBuf>) -> Result<()> {
    let store = SnapshotStore::new(&config.output_dir);
    let mut rows = match input {
        Some(path) => read_kpi_snapshot(&path)?,
        None => store.read_kpi()?,
    };
    rows.sort_by_key(|r| r.date);
    let summary = summarize(&rows)?;

    let classes: serde_json::Map<String, serde_json::Value> = SUMMARY_METRICS
        .iter()
        .map(|metric| {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.metric(metric)).collect();
            (metric.to_string(), json!(classify_trend(&values, TREND_WINDOW)))
        })
        .collect();

    let output = json!({ "summary": summary, "classification": classes });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_saved_response(config: &PipelineConfig, input: PathBuf) -> Result<()> {
    let raw = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let insights = parse_response(&raw)?;
    let store = SnapshotStore::new(&config.output_dir);
    store.write_insights(&insights)?;

    for item in &insights.action_items {
        println!("[{}] {} -> {}", item.priority, item.issue, item.recommended_action);
    }
    println!("Saved {} and {}", store.insights_path().display(), store.action_plan_path().display());
    Ok(())
}

fn check_config(config: &PipelineConfig) {
    println!("=== Credential status ===");
    for (key, status) in config.credential_status() {
        println!("{:<18} {}", key, status);
    }
    println!("Output directory:  {}", config.output_dir.display());
    println!("Window days:       {}", config.window_days);
    println!("Model:             {}", config.openai_model);
}

