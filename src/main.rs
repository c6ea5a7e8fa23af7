//! # Enrichment Runner
//!
//! ## Purpose
//! Command-line batch runner for the court-document enrichment pipeline.
//! Loads configuration, initializes storage and the document source, runs
//! one resumable enrichment batch, and reports the structured result.
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Initialize storage, source, and pipeline components
//! 4. Fetch and enrich one batch (resuming from the saved checkpoint)
//! 5. Report counts and scores; interruptible via ctrl-c

use clap::{Arg, ArgAction, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use docket_enrichment::{
    config::Config,
    enrichment::EnrichmentPipeline,
    extract::HttpTextExtractor,
    sink::HttpSearchSink,
    sources::{CourtListenerSource, DocumentSource, FetchQuery, RetryPolicy},
    storage::StorageManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("enrichment-runner")
        .version("0.1.0")
        .about("Court-document enrichment and deduplication pipeline")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("court")
                .long("court")
                .value_name("COURT_ID")
                .help("Restrict the fetch to one court"),
        )
        .arg(
            Arg::new("judge")
                .long("judge")
                .value_name("NAME")
                .help("Restrict the fetch to one judge"),
        )
        .arg(
            Arg::new("after")
                .long("after")
                .value_name("YYYY-MM-DD")
                .help("Only documents filed after this date"),
        )
        .arg(
            Arg::new("before")
                .long("before")
                .value_name("YYYY-MM-DD")
                .help("Only documents filed before this date"),
        )
        .arg(
            Arg::new("max-docs")
                .long("max-docs")
                .value_name("N")
                .help("Maximum documents to fetch")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("ignore-checkpoint")
                .long("ignore-checkpoint")
                .help("Start from the beginning instead of resuming")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Run health checks and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = Config::from_file(config_path)?;

    init_logging(&config)?;
    info!("Starting enrichment runner");
    info!("Configuration loaded from: {}", config_path);

    let storage = Arc::new(StorageManager::new(config.storage.clone()).await?);
    let retry = RetryPolicy::from(&config.retry);
    let source = CourtListenerSource::new(config.source.clone(), retry)?;

    if matches.get_flag("check-health") {
        return run_health_checks(&source, &storage).await;
    }

    let mut pipeline = EnrichmentPipeline::new(config.enrichment.clone(), storage.clone()).await?;
    if config.sink.enabled {
        let sink = HttpSearchSink::new(config.sink.endpoint.clone(), config.sink.timeout_seconds)?;
        pipeline = pipeline.with_sink(Arc::new(sink));
    }
    if config.extraction.enabled {
        let extractor = HttpTextExtractor::new(
            config.extraction.endpoint.clone(),
            config.extraction.timeout_seconds,
        )?;
        pipeline = pipeline.with_extractor(Arc::new(extractor));
    }

    let query = FetchQuery {
        court_id: matches.get_one::<String>("court").cloned(),
        judge_name: matches.get_one::<String>("judge").cloned(),
        date_after: parse_date(matches.get_one::<String>("after"))?,
        date_before: parse_date(matches.get_one::<String>("before"))?,
        max_results: matches
            .get_one::<usize>("max-docs")
            .copied()
            .unwrap_or(config.enrichment.batch_size),
    };

    if matches.get_flag("ignore-checkpoint") {
        let documents = source.fetch(&query).await?;
        report(&pipeline.run_batch(documents).await?);
        return Ok(());
    }

    tokio::select! {
        result = pipeline.run_from_source(&source, &query) => {
            report(&result?);
        }
        _ = signal::ctrl_c() => {
            warn!("Interrupted; checkpoint reflects the last completed document");
        }
    }

    Ok(())
}

/// Initialize logging and tracing
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(fmt_layer.json().with_filter(filter))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt_layer.with_filter(filter))
            .init();
    }

    Ok(())
}

/// Run health checks against the source and storage, then exit
async fn run_health_checks(
    source: &CourtListenerSource,
    storage: &StorageManager,
) -> anyhow::Result<()> {
    storage.health_check().await?;
    info!("Storage is healthy");

    let health = source.health_check().await?;
    if health.is_healthy {
        info!(
            "Source '{}' is healthy ({} ms)",
            source.name(),
            health.response_time_ms
        );
        Ok(())
    } else {
        anyhow::bail!(
            "Source '{}' unhealthy: {}",
            source.name(),
            health.error_message.unwrap_or_default()
        )
    }
}

fn parse_date(raw: Option<&String>) -> anyhow::Result<Option<chrono::NaiveDate>> {
    match raw {
        Some(s) => Ok(Some(chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?)),
        None => Ok(None),
    }
}

/// Print the structured batch result
fn report(result: &docket_enrichment::BatchResult) {
    info!(
        "Batch finished (success={}): {} processed, {} stored, {} duplicates, \
         {} already enhanced, {} unchanged, {} pending content, {} validation failures, {} errors",
        result.success,
        result.stats.documents_processed,
        result.stats.stored,
        result.stats.duplicates_skipped,
        result.stats.already_enhanced_skipped,
        result.stats.unchanged_skipped,
        result.stats.pending_content,
        result.stats.validation_failures,
        result.stats.errors,
    );
    info!(
        "Batch scores: completeness {:.1}%, quality {:.1}% over {} documents",
        result.verification.completeness_score,
        result.verification.quality_score,
        result.verification.documents
    );
    for error in &result.errors {
        warn!("{}", error);
    }
}
