use rand::{thread_rng, Rng};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::error::CrawlError;

/// Inclusive ID range split into consecutive fixed-size batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    start: u32,
    end: u32,
    batch_size: usize,
}

impl BatchPlan {
    pub fn new(start: u32, end: u32, batch_size: usize) -> Result<Self, CrawlError> {
        if start == 0 {
            return Err(CrawlError::InvalidPlan("start id must be positive".to_string()));
        }
        if start > end {
            return Err(CrawlError::InvalidPlan(format!(
                "start id {} is greater than end id {}",
                start, end
            )));
        }
        if batch_size == 0 {
            return Err(CrawlError::InvalidPlan("batch size must be positive".to_string()));
        }

        Ok(Self {
            start,
            end,
            batch_size,
        })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of IDs in the plan
    pub fn id_count(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    pub fn batch_count(&self) -> u64 {
        self.id_count().div_ceil(self.batch_size as u64)
    }

    /// Batches in increasing ID order; the last one may be short
    pub fn batches(&self) -> impl Iterator<Item = RangeInclusive<u32>> {
        let end = self.end;
        let step = u32::try_from(self.batch_size).unwrap_or(u32::MAX);
        let mut next = Some(self.start);

        std::iter::from_fn(move || {
            let batch_start = next?;
            let batch_end = batch_start.saturating_add(step - 1).min(end);
            next = if batch_end < end { Some(batch_end + 1) } else { None };
            Some(batch_start..=batch_end)
        })
    }
}

/// Uniformly random pause between batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PausePolicy {
    min_ms: u64,
    max_ms: u64,
}

impl PausePolicy {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn next_delay(&self) -> Duration {
        let mut rng = thread_rng();
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }

        debug!("Pausing {} ms before next batch", delay.as_millis());
        sleep(delay).await;
    }
}
