//! Cohort processor: orchestrates base-data retrieval, in-process
//! group/rollup onto the configured breakpoints, metric computation, and
//! output formatting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{NaiveDate, Utc};
use tracing::debug;

use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::{
    AppliedFilter, CohortConfig, CohortData, CohortMetric, CohortMode, DateRange, FilterValue,
};

use crate::base::{BreakpointAggregates, CohortBaseRow, CohortBaseSource};
use crate::batch::{BatchMetrics, CohortPipelineConfig, CohortPipelineProcessor};
use crate::format::format_cohort_results;
use crate::metrics::{calculate_cohort_metric, MetricInput};

/// Query-hash bucket width; identical requests inside one bucket share a
/// cache identity.
const QUERY_HASH_BUCKET_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
pub struct CohortProcessingOptions {
    /// Present for callers that page the output; the processing path does
    /// not truncate rows.
    pub max_cohorts: usize,
    pub use_pipeline_mode: bool,
    pub batch_size_days: u32,
    pub max_concurrency: usize,
}

impl Default for CohortProcessingOptions {
    fn default() -> Self {
        Self {
            max_cohorts: 100,
            use_pipeline_mode: false,
            batch_size_days: 50,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortProcessingMetadata {
    pub total_cohorts: usize,
    pub processing_time_ms: u64,
    pub breakpoints_used: Vec<u32>,
    pub query_hash: String,
    /// Only present in pipelined mode.
    pub pipeline_metrics: Option<BatchMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortProcessingResult {
    pub data: Vec<CohortData>,
    pub metadata: CohortProcessingMetadata,
}

struct CohortRollup {
    ftd_count: u64,
    total_cohort_size: f64,
    breakpoints: BTreeMap<u32, BreakpointAggregates>,
}

pub struct CohortProcessor {
    config: CohortConfig,
    options: CohortProcessingOptions,
    source: Arc<dyn CohortBaseSource>,
    pipeline: Option<CohortPipelineProcessor>,
}

impl CohortProcessor {
    pub fn new(
        config: CohortConfig,
        options: CohortProcessingOptions,
        source: Arc<dyn CohortBaseSource>,
    ) -> Self {
        let pipeline = options.use_pipeline_mode.then(|| {
            CohortPipelineProcessor::new(CohortPipelineConfig {
                batch_size_days: options.batch_size_days,
                max_concurrency: options.max_concurrency,
                enable_pipelining: true,
            })
        });

        Self {
            config,
            options,
            source,
            pipeline,
        }
    }

    pub fn config(&self) -> &CohortConfig {
        &self.config
    }

    pub fn options(&self) -> &CohortProcessingOptions {
        &self.options
    }

    /// Run the analysis: base data, breakpoint mapping, metric values,
    /// presentation formatting.
    pub async fn process_cohorts(
        &self,
        filters: &[AppliedFilter],
    ) -> ReportResult<CohortProcessingResult> {
        let start = Instant::now();

        if let Some(pipeline) = &self.pipeline {
            return self.process_pipelined(pipeline, filters).await;
        }

        let base_data = self
            .source
            .cohort_base_data(&self.config, filters)
            .await
            .map_err(|e| ReportError::execution("Cohort processing", e))?;

        let data = self.map_breakpoints(base_data);
        let data = format_cohort_results(data, &self.config.breakpoints);

        Ok(CohortProcessingResult {
            metadata: CohortProcessingMetadata {
                total_cohorts: data.len(),
                processing_time_ms: start.elapsed().as_millis() as u64,
                breakpoints_used: self.config.breakpoints.clone(),
                query_hash: self.generate_query_hash(filters),
                pipeline_metrics: None,
            },
            data,
        })
    }

    /// Pipelined mode: the batch executor owns retrieval and reports its
    /// own processing time.
    async fn process_pipelined(
        &self,
        pipeline: &CohortPipelineProcessor,
        filters: &[AppliedFilter],
    ) -> ReportResult<CohortProcessingResult> {
        let batch_result = pipeline
            .process_cohort_batches(&self.config, filters, self.source.clone())
            .await?;

        let data = self.map_breakpoints(batch_result.rows);
        let data = format_cohort_results(data, &self.config.breakpoints);

        Ok(CohortProcessingResult {
            metadata: CohortProcessingMetadata {
                total_cohorts: data.len(),
                processing_time_ms: batch_result.metadata.processing_time_ms,
                breakpoints_used: self.config.breakpoints.clone(),
                query_hash: self.generate_query_hash(filters),
                pipeline_metrics: Some(batch_result.metadata),
            },
            data,
        })
    }

    /// Group base rows by cohort date, roll up the per-breakpoint sums,
    /// then compute the configured metric for every breakpoint.
    fn map_breakpoints(&self, base_data: Vec<CohortBaseRow>) -> Vec<CohortData> {
        if base_data.is_empty() {
            return Vec::new();
        }

        let mut groups: BTreeMap<NaiveDate, CohortRollup> = BTreeMap::new();

        for row in base_data {
            let rollup = groups.entry(row.cohort_date).or_insert_with(|| CohortRollup {
                ftd_count: 0,
                total_cohort_size: 0.0,
                breakpoints: BTreeMap::new(),
            });

            rollup.ftd_count += 1;
            rollup.total_cohort_size += row.cohort_size;

            for &bp in &self.config.breakpoints {
                let sums = rollup.breakpoints.entry(bp).or_default();
                // Rows missing a breakpoint contribute zero to its sums.
                let partial = row.breakpoints.get(&bp).copied().unwrap_or_default();
                sums.active_players += partial.active_players;
                sums.deposit_sum += partial.deposit_sum;
                sums.ngr_sum += partial.ngr_sum;
                sums.cost_sum += partial.cost_sum;
            }
        }

        debug!(
            cohorts = groups.len(),
            breakpoints = self.config.breakpoints.len(),
            "Cohort rollup complete"
        );

        groups
            .into_iter()
            .map(|(cohort_date, rollup)| {
                let breakpoint_values = self.breakpoint_values(&rollup);
                let weighted_average = weighted_average(&breakpoint_values);
                CohortData {
                    cohort_date,
                    ftd_count: rollup.ftd_count,
                    breakpoint_values,
                    weighted_average,
                }
            })
            .collect()
    }

    fn breakpoint_values(&self, rollup: &CohortRollup) -> BTreeMap<u32, Option<f64>> {
        self.config
            .breakpoints
            .iter()
            .map(|&bp| {
                let sums = rollup.breakpoints.get(&bp).copied().unwrap_or_default();
                let input = MetricInput {
                    active_players: sums.active_players,
                    deposit_sum: sums.deposit_sum,
                    ngr_sum: sums.ngr_sum,
                    cost_sum: sums.cost_sum,
                    cohort_size: rollup.total_cohort_size,
                };
                (bp, calculate_cohort_metric(self.config.metric, &input))
            })
            .collect()
    }

    /// Hash of the query identity, truncated to 5-minute time buckets so
    /// identical requests inside a bucket share a cache entry.
    fn generate_query_hash(&self, filters: &[AppliedFilter]) -> String {
        let mut pairs: Vec<(&str, &FilterValue)> =
            filters.iter().map(|f| (f.id.as_str(), &f.value)).collect();
        pairs.sort_by_key(|(id, _)| *id);

        let payload = serde_json::json!({
            "config": self.config,
            "filters": pairs
                .iter()
                .map(|(id, value)| serde_json::json!({ "id": id, "value": value }))
                .collect::<Vec<_>>(),
            "timestamp": Utc::now().timestamp_millis() / QUERY_HASH_BUCKET_MS,
        });

        BASE64.encode(payload.to_string())
    }
}

/// Mean of the defined breakpoint values. The name is historical; no
/// cohort-size weighting is applied.
fn weighted_average(values: &BTreeMap<u32, Option<f64>>) -> Option<f64> {
    let defined: Vec<f64> = values.values().filter_map(|v| *v).collect();
    if defined.is_empty() {
        return None;
    }
    Some(defined.iter().sum::<f64>() / defined.len() as f64)
}

/// Build a processor with the mode's default breakpoints. Pipelined mode
/// auto-enables for ranges longer than 90 days unless the options force
/// it either way.
pub fn create_cohort_processor(
    mode: CohortMode,
    metric: CohortMetric,
    date_range: DateRange,
    filters: BTreeMap<String, FilterValue>,
    options: Option<CohortProcessingOptions>,
    source: Arc<dyn CohortBaseSource>,
) -> CohortProcessor {
    let config = CohortConfig {
        mode,
        metric,
        breakpoints: mode.default_breakpoints(),
        date_range,
        filters,
    };

    // Explicit options win over the range-length auto-enable.
    let options = options.unwrap_or_else(|| CohortProcessingOptions {
        use_pipeline_mode: date_range.days() > 90,
        ..Default::default()
    });

    CohortProcessor::new(config, options, source)
}

/// One-call API for the common case.
pub async fn process_cohort_analysis(
    mode: CohortMode,
    metric: CohortMetric,
    date_range: DateRange,
    filters: &[AppliedFilter],
    source: Arc<dyn CohortBaseSource>,
) -> ReportResult<CohortProcessingResult> {
    let processor = create_cohort_processor(mode, metric, date_range, BTreeMap::new(), None, source);
    processor.process_cohorts(filters).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MemoryCohortSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn aggregates(active: f64, deposits: f64, ngr: f64, costs: f64) -> BreakpointAggregates {
        BreakpointAggregates {
            active_players: active,
            deposit_sum: deposits,
            ngr_sum: ngr,
            cost_sum: costs,
        }
    }

    fn config_with(metric: CohortMetric, breakpoints: Vec<u32>) -> CohortConfig {
        CohortConfig {
            mode: CohortMode::Day,
            metric,
            breakpoints,
            date_range: DateRange {
                start: date(2025, 1, 1),
                end: date(2025, 1, 31),
            },
            filters: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_rollup_sums_rows_for_same_cohort_date() {
        let day = date(2025, 1, 10);
        let rows = vec![
            CohortBaseRow {
                cohort_date: day,
                cohort_size: 40.0,
                breakpoints: [(7, aggregates(10.0, 400.0, 0.0, 0.0))].into(),
            },
            CohortBaseRow {
                cohort_date: day,
                cohort_size: 60.0,
                breakpoints: [(7, aggregates(15.0, 600.0, 0.0, 0.0))].into(),
            },
        ];

        let processor = CohortProcessor::new(
            config_with(CohortMetric::RetentionRate, vec![7]),
            CohortProcessingOptions::default(),
            Arc::new(MemoryCohortSource::new(rows)),
        );

        let result = processor.process_cohorts(&[]).await.expect("process");
        assert_eq!(result.data.len(), 1);
        let row = &result.data[0];
        assert_eq!(row.ftd_count, 2);
        // 25 active of 100 total cohort members.
        assert_eq!(row.breakpoint_values[&7], Some(25.0));
    }

    #[tokio::test]
    async fn test_weighted_average_is_mean_of_defined_values() {
        // Breakpoint 14 has zero costs, so DEP2COST is undefined there and
        // excluded from the mean: (20 + 40) / 2 = 30.
        let rows = vec![CohortBaseRow {
            cohort_date: date(2025, 1, 5),
            cohort_size: 50.0,
            breakpoints: [
                (7, aggregates(0.0, 200.0, 0.0, 1000.0)),
                (14, aggregates(0.0, 500.0, 0.0, 0.0)),
                (30, aggregates(0.0, 400.0, 0.0, 1000.0)),
            ]
            .into(),
        }];

        let processor = CohortProcessor::new(
            config_with(CohortMetric::Dep2Cost, vec![7, 14, 30]),
            CohortProcessingOptions::default(),
            Arc::new(MemoryCohortSource::new(rows)),
        );

        let result = processor.process_cohorts(&[]).await.expect("process");
        let row = &result.data[0];
        assert_eq!(row.breakpoint_values[&7], Some(20.0));
        assert_eq!(row.breakpoint_values[&14], None);
        assert_eq!(row.breakpoint_values[&30], Some(40.0));
        assert_eq!(row.weighted_average, Some(30.0));
    }

    #[tokio::test]
    async fn test_all_undefined_breakpoints_yield_no_average() {
        let rows = vec![CohortBaseRow {
            cohort_date: date(2025, 1, 5),
            cohort_size: 0.0,
            breakpoints: BTreeMap::new(),
        }];

        let processor = CohortProcessor::new(
            config_with(CohortMetric::RetentionRate, vec![7, 14]),
            CohortProcessingOptions::default(),
            Arc::new(MemoryCohortSource::new(rows)),
        );

        let result = processor.process_cohorts(&[]).await.expect("process");
        let row = &result.data[0];
        assert!(row.breakpoint_values.values().all(|v| v.is_none()));
        assert_eq!(row.weighted_average, None);
    }

    #[tokio::test]
    async fn test_output_carries_full_breakpoint_set() {
        let rows = vec![CohortBaseRow {
            cohort_date: date(2025, 1, 5),
            cohort_size: 10.0,
            breakpoints: [(7, aggregates(5.0, 0.0, 0.0, 0.0))].into(),
        }];

        let processor = CohortProcessor::new(
            config_with(CohortMetric::RetentionRate, vec![1, 7, 30]),
            CohortProcessingOptions::default(),
            Arc::new(MemoryCohortSource::new(rows)),
        );

        let result = processor.process_cohorts(&[]).await.expect("process");
        let keys: Vec<u32> = result.data[0].breakpoint_values.keys().copied().collect();
        assert_eq!(keys, vec![1, 7, 30]);
        assert_eq!(result.metadata.breakpoints_used, vec![1, 7, 30]);
    }

    #[tokio::test]
    async fn test_pipelined_mode_auto_enables_past_ninety_days() {
        let source = Arc::new(MemoryCohortSource::new(vec![CohortBaseRow {
            cohort_date: date(2025, 1, 5),
            cohort_size: 10.0,
            breakpoints: BTreeMap::new(),
        }]));

        let long_range = DateRange {
            start: date(2025, 1, 1),
            end: date(2025, 6, 30),
        };
        let processor = create_cohort_processor(
            CohortMode::Day,
            CohortMetric::RetentionRate,
            long_range,
            BTreeMap::new(),
            None,
            source.clone(),
        );

        let result = processor.process_cohorts(&[]).await.expect("process");
        let pipeline_metrics = result.metadata.pipeline_metrics.expect("pipelined mode");
        assert!(pipeline_metrics.batches > 1);

        let short_range = DateRange {
            start: date(2025, 1, 1),
            end: date(2025, 1, 31),
        };
        let processor = create_cohort_processor(
            CohortMode::Day,
            CohortMetric::RetentionRate,
            short_range,
            BTreeMap::new(),
            None,
            source,
        );
        let result = processor.process_cohorts(&[]).await.expect("process");
        assert!(result.metadata.pipeline_metrics.is_none());
    }

    #[tokio::test]
    async fn test_query_hash_stable_under_filter_order() {
        let source = Arc::new(MemoryCohortSource::new(Vec::new()));
        let processor = CohortProcessor::new(
            config_with(CohortMetric::Roas, vec![7]),
            CohortProcessingOptions::default(),
            source,
        );

        let a = vec![
            AppliedFilter {
                id: "partner".into(),
                value: FilterValue::Text("p1".into()),
            },
            AppliedFilter {
                id: "country".into(),
                value: FilterValue::Text("DE".into()),
            },
        ];
        let b: Vec<AppliedFilter> = a.iter().rev().cloned().collect();

        assert_eq!(
            processor.generate_query_hash(&a),
            processor.generate_query_hash(&b)
        );
    }
}
