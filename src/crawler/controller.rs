use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cli::config::{CrawlerSettings, Credentials};
use crate::crawler::extract::extract;
use crate::crawler::record::{BatchResult, CandidateRecord, FetchOutcome};
use crate::crawler::scheduler::{BatchPlan, PausePolicy};
use crate::error::CrawlError;
use crate::http::auth::Authenticator;
use crate::http::session::Session;
use crate::utils::metrics::{Metrics, MetricsCollector};

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunReport {
    /// Batches in ID order, completion order within a batch
    pub records: Vec<CandidateRecord>,
    pub failed: usize,
    pub batches: usize,
    pub metrics: Metrics,
}

/// Drives an authenticated crawl over an ID range
pub struct CrawlerController<'s> {
    session: &'s Session,
    authenticator: Authenticator,
    settings: CrawlerSettings,
    profile_path: String,
    metrics: MetricsCollector,
}

impl<'s> CrawlerController<'s> {
    pub fn new(
        session: &'s Session,
        authenticator: Authenticator,
        settings: CrawlerSettings,
        profile_path: impl Into<String>,
    ) -> Self {
        Self {
            session,
            authenticator,
            settings,
            profile_path: profile_path.into(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Log in, then fetch every ID of `plan` batch by batch.
    ///
    /// Per-ID failures only shrink the result; a failed login aborts before
    /// any profile is requested.
    pub async fn run(&self, credentials: &Credentials, plan: &BatchPlan) -> Result<RunReport, CrawlError> {
        let span = info_span!("run", run_id = %Uuid::new_v4());
        self.run_inner(credentials, plan).instrument(span).await
    }

    async fn run_inner(&self, credentials: &Credentials, plan: &BatchPlan) -> Result<RunReport, CrawlError> {
        if !self.authenticator.authenticate(self.session, credentials).await? {
            error!("Failed to login, aborting crawl");
            return Err(CrawlError::AuthenticationFailed);
        }

        info!(
            "Crawling ids {}-{} in {} batches of up to {}",
            plan.start(),
            plan.end(),
            plan.batch_count(),
            plan.batch_size()
        );

        let pause = PausePolicy::new(self.settings.pause_min_ms, self.settings.pause_max_ms);
        let mut records = Vec::new();
        let mut failed = 0;
        let mut batches = 0;

        let mut pending_batches = plan.batches().peekable();
        while let Some(ids) = pending_batches.next() {
            let (first, last) = (*ids.start(), *ids.end());
            info!("Processing batch {}-{}", first, last);

            let batch = self.run_batch(ids, plan.batch_size()).await;
            info!(
                scraped = batch.records.len(),
                failed = batch.failures,
                total = records.len() + batch.records.len(),
                "Finished batch {}-{}",
                first,
                last
            );

            failed += batch.failures;
            records.extend(batch.records);
            batches += 1;

            if pending_batches.peek().is_some() {
                pause.wait().await;
            }
        }

        Ok(RunReport {
            records,
            failed,
            batches,
            metrics: self.metrics.get_metrics().await,
        })
    }

    /// Fetch one batch concurrently on the current task, at most `width` at a time
    async fn run_batch(&self, ids: RangeInclusive<u32>, width: usize) -> BatchResult {
        let mut outcomes = stream::iter(ids)
            .map(|id| self.fetch_candidate(id))
            .buffer_unordered(width.max(1));
        let mut batch = BatchResult::default();

        while let Some(outcome) = outcomes.next().await {
            match &outcome {
                FetchOutcome::Scraped(record) => {
                    info!("Scraped candidate {}: {}", record.id, record.name);
                }
                FetchOutcome::Missing { id, status } => {
                    info!("Candidate {} unavailable (status {})", id, status);
                }
                FetchOutcome::Failed { id, error } => {
                    warn!("Error scraping candidate {}: {}", id, error);
                }
            }
            batch.push(outcome);
        }

        batch
    }

    async fn fetch_candidate(&self, id: u32) -> FetchOutcome {
        let url = match self.session.profile_url(&self.profile_path, id) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Failed { id, error: e.into() },
        };

        let mut attempt = 0;
        loop {
            let outcome = self.fetch_once(id, &url).await;
            if attempt >= self.settings.retry_attempts || !outcome.is_transient() {
                return outcome;
            }

            attempt += 1;
            debug!(
                "Retrying candidate {} (attempt {} of {})",
                outcome.id(),
                attempt,
                self.settings.retry_attempts
            );
            sleep(Duration::from_millis(self.settings.retry_backoff_ms)).await;
        }
    }

    async fn fetch_once(&self, id: u32, url: &url::Url) -> FetchOutcome {
        let _in_flight = self.metrics.track_in_flight();
        let timer = self.metrics.start_timer();

        match self.session.get(url.clone()).await {
            Ok(page) => {
                let ok = page.status == StatusCode::OK;
                self.metrics
                    .record_request(ok, timer.end(), Some(page.status.as_u16()), page.body.len())
                    .await;

                if ok {
                    FetchOutcome::Scraped(extract(id, &page.body))
                } else {
                    FetchOutcome::Missing {
                        id,
                        status: page.status.as_u16(),
                    }
                }
            }
            Err(error) => {
                self.metrics.record_request(false, timer.end(), None, 0).await;
                FetchOutcome::Failed { id, error }
            }
        }
    }
}
