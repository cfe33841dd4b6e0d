//! Cohort analysis engine: heavy aggregation stays in the data store,
//! breakpoint mapping and metric computation happen in process.

pub mod base;
pub mod batch;
pub mod format;
pub mod metrics;
pub mod processor;

pub use base::{BreakpointAggregates, CohortBaseRow, CohortBaseSource, MemoryCohortSource};
pub use batch::{BatchMetrics, CohortPipelineConfig, CohortPipelineProcessor};
pub use format::{breakpoint_label, format_cohort_results};
pub use metrics::{calculate_cohort_metric, calculate_detailed_metric, MetricInput, MetricResult};
pub use processor::{
    create_cohort_processor, process_cohort_analysis, CohortProcessingOptions,
    CohortProcessingResult, CohortProcessor,
};
