//! CLI entry point for satflow.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use satflow::{
    DownloadStage, Orchestrator, PipelineConfig, ProductRecord, ProviderFactory, QueryStage,
    SearchCriteria, WorkflowReport,
};
use tracing::{debug, error, info};

mod app_config;
mod cli;
mod exit_handler;

use cli::{Args, Command, DownloadArgs, DownloadOptions, QueryArgs, RunArgs};
use exit_handler::{ProcessExit, determine_exit_outcome};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => error!(error = %e, "failed to read .env"),
    }

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(args: Args) -> Result<ProcessExit> {
    let mut config = app_config::load_pipeline_config(args.config.as_deref())?;

    match args.command {
        Command::Run(run_args) => run_workflow(&mut config, run_args).await,
        Command::Query(query_args) => run_query(&mut config, query_args).await,
        Command::Download(download_args) => run_downloads(&mut config, download_args).await,
    }
}

fn apply_download_options(config: &mut PipelineConfig, options: &DownloadOptions) {
    if let Some(data_dir) = &options.data_dir {
        config.data_dir.clone_from(data_dir);
    }
    if let Some(workers) = options.workers {
        config.workers = usize::from(workers);
    }
    if let Some(attempts) = options.download_attempts {
        config.download_attempts = attempts;
    }
}

fn provider_factory(config: &PipelineConfig) -> Arc<dyn ProviderFactory> {
    Arc::new(config.provider_factory())
}

async fn run_workflow(config: &mut PipelineConfig, args: RunArgs) -> Result<ProcessExit> {
    apply_download_options(config, &args.download);
    if let Some(attempts) = args.query_attempts {
        config.query_attempts = attempts;
    }
    if !args.product_types.is_empty() {
        config.product_types_to_query = args.product_types;
    }
    let config = &*config;

    let orchestrator = Orchestrator::new(config, provider_factory(config))?;
    info!(
        product_types = ?orchestrator.product_types(),
        data_dir = %config.data_dir.display(),
        "satflow starting"
    );

    let report = orchestrator
        .run(args.search.bbox, args.search.start_date, args.search.end_date)
        .await?;
    Ok(finish(&report))
}

async fn run_query(config: &mut PipelineConfig, args: QueryArgs) -> Result<ProcessExit> {
    if let Some(attempts) = args.query_attempts {
        config.query_attempts = attempts;
    }
    config.validate()?;
    let config = &*config;

    let criteria = SearchCriteria::new(
        args.product_type,
        args.search.bbox,
        args.search.start_date,
        args.search.end_date,
    )?;
    let stage = QueryStage::new(
        provider_factory(config),
        Arc::new(config.router()),
        config.query_retry_policy(),
    );
    let records = stage.run_query(&criteria).await?;

    let mut stdout = io::stdout().lock();
    for record in &records {
        let line = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(stdout, "{line}").context("Failed to write to stdout")?;
    }
    stdout.flush().context("Failed to write to stdout")?;

    Ok(ProcessExit::Success)
}

async fn run_downloads(config: &mut PipelineConfig, args: DownloadArgs) -> Result<ProcessExit> {
    apply_download_options(config, &args.download);
    config.validate()?;
    let config = &*config;

    let records = read_records(&args.records)?;
    info!(records = records.len(), "loaded records");

    let stage = DownloadStage::new(
        provider_factory(config),
        Arc::new(config.router()),
        config.workers,
        config.download_retry_policy(),
    )?;
    let report = WorkflowReport::from_downloads(stage.run_downloads(records).await);
    Ok(finish(&report))
}

/// Reads records written by `query` (one JSON object per line) or a single
/// JSON array of records.
fn read_records(path: &Path) -> Result<Vec<ProductRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file '{}'", path.display()))?;
    parse_records(&raw)
        .with_context(|| format!("Failed to parse records file '{}'", path.display()))
}

fn parse_records(raw: &str) -> Result<Vec<ProductRecord>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<ProductRecord>(line)
                .with_context(|| format!("line {}", index + 1))
        })
        .collect()
}

fn finish(report: &WorkflowReport) -> ProcessExit {
    eprintln!("{}", report.summary());
    determine_exit_outcome(report.completed(), report.failed())
}
