//! Cohort base data: the pre-aggregated per-breakpoint rows the data store
//! returns, one (or more) per cohort acquisition date.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::{AppliedFilter, CohortConfig};

/// Sums for one breakpoint of one cohort row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BreakpointAggregates {
    pub active_players: f64,
    pub deposit_sum: f64,
    pub ngr_sum: f64,
    pub cost_sum: f64,
}

/// One base-data row: a cohort acquisition date with its size and the
/// aggregates for every requested breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortBaseRow {
    pub cohort_date: NaiveDate,
    pub cohort_size: f64,
    pub breakpoints: BTreeMap<u32, BreakpointAggregates>,
}

impl CohortBaseRow {
    /// Parse a wire record in the store's column convention:
    /// `cohortDate`, `cohortSize`, and `day{N}_active_players`,
    /// `day{N}_deposit_sum`, `day{N}_ngr_sum`, `day{N}_cost_sum` per
    /// breakpoint. Absent breakpoint columns read as zero.
    pub fn from_wire(record: &Value, breakpoints: &[u32]) -> ReportResult<Self> {
        let cohort_date = record
            .get("cohortDate")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
            .ok_or_else(|| {
                ReportError::Source("Base data record is missing a parsable cohortDate".into())
            })?;

        let cohort_size = record
            .get("cohortSize")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let field = |name: String| record.get(&name).and_then(Value::as_f64).unwrap_or(0.0);

        let breakpoints = breakpoints
            .iter()
            .map(|&bp| {
                (
                    bp,
                    BreakpointAggregates {
                        active_players: field(format!("day{bp}_active_players")),
                        deposit_sum: field(format!("day{bp}_deposit_sum")),
                        ngr_sum: field(format!("day{bp}_ngr_sum")),
                        cost_sum: field(format!("day{bp}_cost_sum")),
                    },
                )
            })
            .collect();

        Ok(Self {
            cohort_date,
            cohort_size,
            breakpoints,
        })
    }
}

/// The heavy aggregation query against the external store. Implementations
/// push the O(rows) scan down and return O(cohort-dates x breakpoints)
/// data.
#[async_trait]
pub trait CohortBaseSource: Send + Sync {
    async fn cohort_base_data(
        &self,
        config: &CohortConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<Vec<CohortBaseRow>>;
}

/// Fixture-backed source for tests: serves the rows whose cohort date
/// falls inside the requested range.
pub struct MemoryCohortSource {
    rows: Vec<CohortBaseRow>,
}

impl MemoryCohortSource {
    pub fn new(rows: Vec<CohortBaseRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl CohortBaseSource for MemoryCohortSource {
    async fn cohort_base_data(
        &self,
        config: &CohortConfig,
        _filters: &[AppliedFilter],
    ) -> ReportResult<Vec<CohortBaseRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                row.cohort_date >= config.date_range.start && row.cohort_date <= config.date_range.end
            })
            .cloned()
            .collect())
    }
}
