//! speech-profiler entry point.
//!
//! This binary is the composition root for the workspace. Responsibilities:
//!
//! 1. **Parse arguments and configuration**: read the TOML file named by
//!    `--config`, validate it into a [`pipeline::PipelineConfig`], and apply
//!    command-line overrides.
//! 2. **Wire observability**: install the `tracing-subscriber` stack, with an
//!    OpenTelemetry OTLP exporter when one is configured.
//! 3. **Construct infrastructure**: open the source and result stores, build
//!    the Ollama client, the telemetry log and the report writer, and inject
//!    them into [`nodes::RunOrchestrator`].
//! 4. **Map the outcome to an exit code**: configuration errors and an
//!    unreadable source or result store exit non-zero; per-member failures do
//!    not.

mod args;
mod observability;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use llm::OllamaClient;
use nodes::{RunOptions, RunOrchestrator, RunSummary};
use pipeline::{ConfigError, DateRange, MemberSelection, PipelineConfig, PipelineError, RunId};
use storage::{CsvTelemetryLog, MarkdownReportWriter, SqliteCorpusSource, SqliteResultStore};
use tracing::{error, info, warn};

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let guard = match observability::init(args.json_logs) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("speech-profiler: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match run(args).await {
        Ok(summary) => {
            if summary.report.is_none() && !summary.completed.is_empty() {
                warn!("Analyses were stored but no report file was written");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run aborted");
            ExitCode::FAILURE
        }
    };

    guard.shutdown();
    code
}

async fn run(args: Args) -> anyhow::Result<RunSummary> {
    let text = tokio::fs::read_to_string(&args.config)
        .await
        .with_context(|| format!("reading configuration file {}", args.config.display()))?;
    let mut config = PipelineConfig::from_toml_str(&text)
        .map_err(PipelineError::from)
        .with_context(|| format!("loading configuration file {}", args.config.display()))?;
    if let Some(count) = args.count {
        config = config.with_number_of_members(count.get());
    }

    let date_to = args.date_to.unwrap_or_else(|| Local::now().date_naive());
    let date_range = resolve_date_range(args.date_from, date_to, config.output.date_window_days)
        .map_err(PipelineError::from)?;

    let run_id = RunId::new_random();
    info!(
        %run_id,
        config = %args.config.display(),
        start_index = args.start_index,
        limit = config.limits.number_of_members,
        date_from = %date_range.start(),
        date_to = %date_range.end(),
        "Starting run"
    );

    let source = SqliteCorpusSource::open(&config.database.source_database)
        .await
        .map_err(PipelineError::from)?;
    let results = Arc::new(
        SqliteResultStore::open(&config.database.analysis_database)
            .await
            .map_err(PipelineError::ResultStoreUnavailable)?,
    );
    let inference = OllamaClient::new(config.inference.api_url.clone())
        .context("building HTTP client")?;
    let telemetry = CsvTelemetryLog::new(&config.logging.log_file);
    let reports = MarkdownReportWriter::new(&config.output.report_directory);

    let selection = MemberSelection {
        limit: config.limits.number_of_members,
        start_index: args.start_index,
    };
    let config = Arc::new(config);
    let orchestrator = RunOrchestrator::new(
        Arc::clone(&config),
        Arc::new(source),
        Arc::new(inference),
        results.clone(),
        Arc::new(telemetry),
        Arc::new(reports),
    );

    let summary = orchestrator
        .run(RunOptions {
            run_id,
            selection,
            date_range,
        })
        .await?;

    match results.count().await {
        Ok(stored) => info!(
            stored,
            path = %results.path().display(),
            "Result store totals"
        ),
        Err(e) => warn!(error = %e, "Result store could not be counted"),
    }
    Ok(summary)
}

/// Builds the report window from the command line and the configured default
/// width.
fn resolve_date_range(
    date_from: Option<NaiveDate>,
    date_to: NaiveDate,
    window_days: u32,
) -> Result<DateRange, ConfigError> {
    match date_from {
        None => DateRange::ending_on(date_to, window_days).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "Output.date_window_days".to_string(),
                reason: format!("{window_days} days before {date_to} is out of range"),
            }
        }),
        Some(from) => DateRange::new(from, date_to).ok_or_else(|| ConfigError::InvalidValue {
            key: "--date-from".to_string(),
            reason: format!("{from} is after --date-to {date_to}"),
        }),
    }
}
