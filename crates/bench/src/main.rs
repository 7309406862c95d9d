//! QuoteForge Benchmark Runner
//!
//! Answers every fixture query in baseline and enhanced mode and writes
//! one report row per run.
//! Handles:
//! - Configuration and logging setup
//! - Optional Prometheus exporter
//! - Bounded-concurrency query sweep
//! - Report output and per-mode summary

mod fixture;
mod report;
mod sweep;

use anyhow::Context;
use fixture::Fixture;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use quoteforge_common::{
    config::{AppConfig, ObservabilityConfig},
    generation::create_chat_backend,
    metrics, QueryRunner,
};
use std::net::SocketAddr;
use sweep::MODES;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting QuoteForge benchmark v{}",
        quoteforge_common::VERSION
    );

    init_metrics(&config.observability)?;
    metrics::register_metrics();

    let fixture = Fixture::load(&config.bench.fixture_path)?;
    info!(
        queries = fixture.queries.len(),
        path = %config.bench.fixture_path,
        "Loaded retrieval fixture"
    );

    let backend = create_chat_backend(&config.generation)?;
    let runner = QueryRunner::from_config(&config, &backend)?;
    info!(
        provider = backend.name(),
        model = %config.generation.model,
        concurrency = config.bench.concurrency,
        "Query runner ready"
    );

    let jobs = sweep::plan(&fixture);
    let rows = sweep::run(&runner, jobs, config.bench.concurrency).await;

    report::write_report(&config.bench.output_path, &rows)?;
    info!(rows = rows.len(), path = %config.bench.output_path, "Report written");

    for mode in MODES {
        let summary = report::summarize(&rows, mode);
        info!(
            mode = %summary.mode,
            queries = summary.queries,
            failed = summary.failed,
            mean_cost_usd = ?summary.mean_cost_usd,
            mean_ttft_s = ?summary.mean_ttft_s,
            mean_total_time_s = ?summary.mean_total_time_s,
            mean_verbatim_rate = ?summary.mean_verbatim_rate,
            mean_hallucination_rate = ?summary.mean_hallucination_rate,
            mean_near_match_rate = ?summary.mean_near_match_rate,
            mean_coherence = ?summary.mean_coherence,
            "Benchmark summary"
        );
    }

    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), metrics::GENERATION_BUCKETS)?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
