//! Pipelined cohort retrieval: large date ranges are split into windows
//! fetched concurrently, bounded by a semaphore, and merged in order.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::debug;

use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::{AppliedFilter, CohortConfig, DateRange};

use crate::base::{CohortBaseRow, CohortBaseSource};

#[derive(Debug, Clone, Copy)]
pub struct CohortPipelineConfig {
    /// Days of the requested range covered by one batch.
    pub batch_size_days: u32,
    pub max_concurrency: usize,
    pub enable_pipelining: bool,
}

impl Default for CohortPipelineConfig {
    fn default() -> Self {
        Self {
            batch_size_days: 50,
            max_concurrency: 4,
            enable_pipelining: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub batches: usize,
    pub batch_size_days: u32,
    pub max_concurrency: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug)]
pub struct BatchResult {
    pub rows: Vec<CohortBaseRow>,
    pub metadata: BatchMetrics,
}

pub struct CohortPipelineProcessor {
    config: CohortPipelineConfig,
}

impl CohortPipelineProcessor {
    pub fn new(config: CohortPipelineConfig) -> Self {
        Self { config }
    }

    /// Split the configured date range into contiguous windows.
    fn batch_windows(&self, range: &DateRange) -> Vec<DateRange> {
        let step = Duration::days(self.config.batch_size_days.max(1) as i64);
        let mut windows = Vec::new();
        let mut start = range.start;

        while start <= range.end {
            let end = (start + step - Duration::days(1)).min(range.end);
            windows.push(DateRange { start, end });
            start = end + Duration::days(1);
        }

        windows
    }

    /// Fetch base data for every window concurrently. In-flight batches
    /// are capped at `max_concurrency`; a failed batch fails the whole
    /// operation rather than being dropped from the merge.
    pub async fn process_cohort_batches(
        &self,
        config: &CohortConfig,
        filters: &[AppliedFilter],
        source: Arc<dyn CohortBaseSource>,
    ) -> ReportResult<BatchResult> {
        let start = Instant::now();
        let windows = self.batch_windows(&config.date_range);
        let batches = windows.len();

        debug!(
            batches = batches,
            batch_size_days = self.config.batch_size_days,
            max_concurrency = self.config.max_concurrency,
            "Dispatching cohort batches"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(batches);

        for window in windows {
            let semaphore = semaphore.clone();
            let source = source.clone();
            let filters = filters.to_vec();
            let mut batch_config = config.clone();
            batch_config.date_range = window;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    ReportError::execution("Cohort batch", "concurrency limiter closed")
                })?;
                source.cohort_base_data(&batch_config, &filters).await
            }));
        }

        let mut rows = Vec::new();
        for handle in handles {
            let batch = handle
                .await
                .map_err(|e| ReportError::execution("Cohort batch", e))??;
            rows.extend(batch);
        }

        metrics::counter!("cohort.batches").increment(batches as u64);

        Ok(BatchResult {
            rows,
            metadata: BatchMetrics {
                batches,
                batch_size_days: self.config.batch_size_days,
                max_concurrency: self.config.max_concurrency,
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
        })
    }
}
