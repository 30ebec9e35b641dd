use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::cli::config::{CrawlerConfig, Credentials};
use crate::crawler::controller::CrawlerController;
use crate::crawler::scheduler::BatchPlan;
use crate::http::auth::Authenticator;
use crate::http::session::{ConnectionLimits, Session};
use crate::storage::sink::{FileSink, ResultSink};

/// Exit code when the run finished without a single record
pub const EXIT_NO_RECORDS: u8 = 2;

/// Exit code after Ctrl-C
pub const EXIT_INTERRUPTED: u8 = 130;

/// Log in, crawl the configured range and write the result files
pub async fn crawl(config: CrawlerConfig) -> Result<ExitCode> {
    let plan = BatchPlan::new(
        config.crawler.start_id,
        config.crawler.end_id,
        config.crawler.batch_size,
    )?;
    let credentials = Credentials::from_env(&config.site.credentials)?;

    let limits = ConnectionLimits::from_settings(&config.http).at_least(plan.batch_size());
    let session = Session::open(&config.site.base_url, &config.http, limits)
        .context("Failed to open HTTP session")?;

    let controller = CrawlerController::new(
        &session,
        Authenticator::new(&config.site),
        config.crawler.clone(),
        config.site.profile_path.clone(),
    );

    // Dropping the run future on interrupt discards the partial results;
    // the session is released when this function returns either way.
    let report = tokio::select! {
        result = controller.run(&credentials, &plan) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Scraping interrupted by user, partial results discarded");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    let metrics = &report.metrics;
    info!(
        started = %metrics.start_time.to_rfc3339(),
        statuses = ?metrics.status_codes,
        requests = metrics.total_requests,
        ok = metrics.successful_requests,
        failed = metrics.failed_requests,
        bytes = metrics.bytes_downloaded,
        avg_ms = metrics.average_duration_ms(),
        peak_in_flight = metrics.peak_in_flight,
        "Crawl finished: {} batches, {} candidates, {} ids without a record",
        report.batches,
        report.records.len(),
        report.failed
    );

    if report.records.is_empty() {
        warn!("No candidates scraped, nothing to save");
        return Ok(ExitCode::from(EXIT_NO_RECORDS));
    }

    FileSink::from_settings(&config.output)
        .persist(&report.records)
        .await
        .context("Failed to save candidates")?;

    info!("Scraping completed. Total candidates scraped: {}", report.records.len());
    Ok(ExitCode::SUCCESS)
}

/// Print the effective configuration
pub fn show_config(config: &CrawlerConfig) -> Result<()> {
    let rendered = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    println!("Current configuration:");
    println!("{}", rendered);

    Ok(())
}
