//! ClickHouse client adapters for the extraction and cohort source seams.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use traffboard_cohort::base::{BreakpointAggregates, CohortBaseRow, CohortBaseSource};
use traffboard_core::config::ClickHouseConfig;
use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::{AppliedFilter, CohortConfig, DataSourceConfig};
use traffboard_pipeline::extract::DataSource;

use crate::sql::{build_cohort_slice_query, build_extraction_query};

fn clickhouse_client(config: &ClickHouseConfig) -> clickhouse::Client {
    clickhouse::Client::default()
        .with_url(&config.url)
        .with_database(&config.database)
}

// ─── Cohort base data ───────────────────────────────────────────────────────

/// One (cohort date, breakpoint) slice of the aggregation result.
#[derive(Debug, clickhouse::Row, Deserialize)]
struct CohortSliceRow {
    cohort_date: String,
    cohort_size: f64,
    breakpoint: u32,
    active_players: f64,
    deposit_sum: f64,
    ngr_sum: f64,
    cost_sum: f64,
}

/// Issues the heavy per-breakpoint aggregation against ClickHouse and
/// folds the slices back into one row per cohort date.
pub struct ClickHouseCohortSource {
    client: clickhouse::Client,
    table: String,
}

impl ClickHouseCohortSource {
    pub fn new(config: &ClickHouseConfig, table: &str) -> Self {
        info!(url = %config.url, table = table, "Cohort source connected to ClickHouse");
        Self {
            client: clickhouse_client(config),
            table: table.to_string(),
        }
    }

    fn fold_slices(slices: Vec<CohortSliceRow>) -> ReportResult<Vec<CohortBaseRow>> {
        let mut rows: BTreeMap<NaiveDate, CohortBaseRow> = BTreeMap::new();

        for slice in slices {
            let cohort_date = NaiveDate::parse_from_str(&slice.cohort_date, "%Y-%m-%d")
                .map_err(|e| ReportError::Source(format!("Bad cohort date from store: {e}")))?;

            let row = rows.entry(cohort_date).or_insert_with(|| CohortBaseRow {
                cohort_date,
                cohort_size: slice.cohort_size,
                breakpoints: BTreeMap::new(),
            });

            row.breakpoints.insert(
                slice.breakpoint,
                BreakpointAggregates {
                    active_players: slice.active_players,
                    deposit_sum: slice.deposit_sum,
                    ngr_sum: slice.ngr_sum,
                    cost_sum: slice.cost_sum,
                },
            );
        }

        Ok(rows.into_values().collect())
    }
}

#[async_trait]
impl CohortBaseSource for ClickHouseCohortSource {
    async fn cohort_base_data(
        &self,
        config: &CohortConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<Vec<CohortBaseRow>> {
        let sql = build_cohort_slice_query(&self.table, config, filters);
        debug!(
            breakpoints = config.breakpoints.len(),
            "Running cohort base-data aggregation"
        );

        let slices = self
            .client
            .query(&sql)
            .fetch_all::<CohortSliceRow>()
            .await
            .map_err(|e| ReportError::Source(format!("Cohort base-data query failed: {e}")))?;

        Self::fold_slices(slices)
    }
}

// ─── Raw extraction ─────────────────────────────────────────────────────────

#[derive(Debug, clickhouse::Row, Serialize, Deserialize)]
struct ConversionRecord {
    date: String,
    foreign_partner_id: String,
    foreign_campaign_id: String,
    traffic_source: String,
    device_type: String,
    country: String,
    all_clicks: u64,
    unique_clicks: u64,
    registrations_count: u64,
    ftd_count: u64,
    deposits_count: u64,
}

/// Row extraction for database-backed pipelines.
pub struct ClickHouseDataSource {
    client: clickhouse::Client,
    table: String,
}

impl ClickHouseDataSource {
    pub fn new(config: &ClickHouseConfig, table: &str) -> Self {
        info!(url = %config.url, table = table, "Data source connected to ClickHouse");
        Self {
            client: clickhouse_client(config),
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl DataSource for ClickHouseDataSource {
    async fn extract(
        &self,
        _config: &DataSourceConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<Vec<Value>> {
        let sql = build_extraction_query(&self.table, filters);

        let records = self
            .client
            .query(&sql)
            .fetch_all::<ConversionRecord>()
            .await
            .map_err(|e| ReportError::Source(format!("Extraction query failed: {e}")))?;

        records
            .into_iter()
            .map(|record| serde_json::to_value(record).map_err(ReportError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(date: &str, bp: u32, deposits: f64) -> CohortSliceRow {
        CohortSliceRow {
            cohort_date: date.to_string(),
            cohort_size: 100.0,
            breakpoint: bp,
            active_players: 10.0,
            deposit_sum: deposits,
            ngr_sum: 0.0,
            cost_sum: 0.0,
        }
    }

    #[test]
    fn test_fold_groups_slices_by_date() {
        let rows = ClickHouseCohortSource::fold_slices(vec![
            slice("2025-01-01", 7, 100.0),
            slice("2025-01-01", 30, 250.0),
            slice("2025-01-02", 7, 50.0),
        ])
        .expect("fold");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].breakpoints.len(), 2);
        assert_eq!(rows[0].breakpoints[&30].deposit_sum, 250.0);
        assert_eq!(rows[1].breakpoints[&7].deposit_sum, 50.0);
    }

    #[test]
    fn test_fold_rejects_malformed_dates() {
        let result = ClickHouseCohortSource::fold_slices(vec![slice("not-a-date", 7, 1.0)]);
        assert!(result.is_err());
    }
}
