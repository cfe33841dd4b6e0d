//! ClickHouse-backed implementations of the report engine's data source
//! seams: raw-row extraction and the cohort base-data aggregation.

pub mod source;
pub mod sql;

pub use source::{ClickHouseCohortSource, ClickHouseDataSource};
pub use sql::{build_cohort_base_query, build_cohort_slice_query, build_extraction_query};
