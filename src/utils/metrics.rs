use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Request metrics for one crawl run
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<Metrics>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Metrics data structure
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Start time of the metrics collection
    pub start_time: DateTime<Utc>,

    /// Total profile requests made, retries included
    pub total_requests: usize,

    /// Requests answered with 200
    pub successful_requests: usize,

    /// Non-200 answers and transport errors
    pub failed_requests: usize,

    /// Sum of request durations in milliseconds
    pub total_duration_ms: u64,

    pub bytes_downloaded: usize,

    /// Most profile requests observed in flight at once
    pub peak_in_flight: usize,

    /// HTTP status code counts
    pub status_codes: HashMap<u16, usize>,
}

impl Metrics {
    pub fn average_duration_ms(&self) -> u64 {
        if self.total_requests == 0 {
            0
        } else {
            self.total_duration_ms / self.total_requests as u64
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let metrics = Metrics {
            start_time: Utc::now(),
            ..Default::default()
        };

        Self {
            metrics: Arc::new(Mutex::new(metrics)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record a finished request
    pub async fn record_request(
        &self,
        success: bool,
        duration_ms: u64,
        status_code: Option<u16>,
        bytes: usize,
    ) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        metrics.bytes_downloaded += bytes;
        metrics.total_duration_ms += duration_ms;

        if let Some(code) = status_code {
            *metrics.status_codes.entry(code).or_default() += 1;
        }
    }

    /// Count a request as in flight until the guard is dropped
    pub fn track_in_flight(&self) -> InFlightGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Start timing a request
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Snapshot of all metrics
    pub async fn get_metrics(&self) -> Metrics {
        let mut snapshot = self.metrics.lock().await.clone();
        snapshot.peak_in_flight = self.peak_in_flight();
        snapshot
    }
}

/// Decrements the in-flight count on drop
pub struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
