//! Shared report engine types: filters, pipelines, report payloads, cohorts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ReportError, ReportResult};

/// Data version stamped into every report's metadata.
pub const DATA_VERSION: &str = "1.0.0";

// ─── Filters ────────────────────────────────────────────────────────────────

/// A concrete value supplied for a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
    DateRange { start: NaiveDate, end: NaiveDate },
}

/// A filter value bound to the filter definition it satisfies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilter {
    pub id: String,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Text,
    Number,
    Select,
    MultiSelect,
    DateRange,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

/// Validation rules attached to a filter definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterValidationRules {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Regex pattern applied to text values.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Declares a filter a report exposes to its callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub id: String,
    pub label: String,
    pub filter_type: FilterType,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub options: Vec<FilterOption>,
    #[serde(default)]
    pub validation: Option<FilterValidationRules>,
}

// ─── Report payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Conversion,
    Cohort,
    Landing,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub execution_time_ms: u64,
    pub data_version: String,
    pub cache_status: CacheStatus,
    pub last_refresh: DateTime<Utc>,
    pub query_hash: String,
    /// Filter values echoed back to the caller.
    pub filters: Vec<FilterValue>,
}

/// Uniform output contract for every pipeline execution and plugin processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData<T> {
    pub rows: Vec<T>,
    pub total_count: usize,
    pub metadata: ReportMetadata,
}

/// Report identity a plugin data processor is invoked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseReportConfig {
    pub id: String,
    pub title: String,
    pub report_type: ReportType,
}

// ─── Pipelines ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    Database,
    Api,
    /// Fixture-backed source used by tests and local development.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub id: String,
    pub source_type: DataSourceType,
    /// Required for API sources; database sources resolve connections
    /// from application config.
    #[serde(default)]
    pub connection_string: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformType {
    Filter,
    Aggregate,
    Cohort,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformStep {
    pub id: String,
    pub transform_type: TransformType,
    /// Execution sequence; unique within a pipeline.
    pub order: u32,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    #[default]
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    #[serde(default)]
    pub strategy: CacheStrategy,
    #[serde(default)]
    pub invalidation_rules: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// A registered extract-transform-cache sequence producing report data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPipeline {
    pub id: String,
    pub source: DataSourceConfig,
    pub transforms: Vec<DataTransformStep>,
    pub cache: CacheConfig,
    pub output: OutputConfig,
}

// ─── Cohorts ────────────────────────────────────────────────────────────────

/// Day-mode breakpoint offsets measured from the cohort acquisition date.
pub const DAY_BREAKPOINTS: [u32; 7] = [1, 3, 7, 14, 30, 60, 90];

/// Week-mode breakpoint offsets.
pub const WEEK_BREAKPOINTS: [u32; 5] = [1, 2, 4, 8, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortMode {
    Day,
    Week,
}

impl CohortMode {
    pub fn default_breakpoints(self) -> Vec<u32> {
        match self {
            Self::Day => DAY_BREAKPOINTS.to_vec(),
            Self::Week => WEEK_BREAKPOINTS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortMetric {
    #[serde(rename = "dep2cost")]
    Dep2Cost,
    Roas,
    AvgDepositSum,
    RetentionRate,
}

/// Inclusive date range; `end >= start` is enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ReportResult<Self> {
        if end < start {
            return Err(ReportError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of calendar days spanned, inclusive of both endpoints.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Drives both the base-data aggregation shape and the per-breakpoint
/// metric computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortConfig {
    pub mode: CohortMode,
    pub metric: CohortMetric,
    pub breakpoints: Vec<u32>,
    pub date_range: DateRange,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,
}

/// One output row of cohort analysis: a cohort acquisition date with its
/// per-breakpoint metric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortData {
    pub cohort_date: NaiveDate,
    pub ftd_count: u64,
    /// Metric value per configured breakpoint; `None` where the metric is
    /// undefined for that breakpoint (zero denominator).
    pub breakpoint_values: BTreeMap<u32, Option<f64>>,
    /// Plain mean of the defined breakpoint values. The name is historical;
    /// no cohort-size weighting is applied.
    pub weighted_average: Option<f64>,
}
