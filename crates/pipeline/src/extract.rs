//! Data extraction seam. The relational store behind it is an external
//! collaborator; concrete sources implement [`DataSource`].

use async_trait::async_trait;
use serde_json::Value;

use traffboard_core::error::ReportResult;
use traffboard_core::types::{AppliedFilter, DataSourceConfig, FilterValue};

/// Pulls raw rows from a data source given the pipeline's source config and
/// the caller's applied filters.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn extract(
        &self,
        config: &DataSourceConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<Vec<Value>>;
}

/// Equality match of one applied filter against a row field of the same
/// name. Date-range filters are left to the source's query layer.
pub fn filter_matches_row(row: &Value, filter: &AppliedFilter) -> bool {
    let Some(field) = row.get(&filter.id) else {
        return false;
    };

    match &filter.value {
        FilterValue::Text(s) => field.as_str() == Some(s.as_str()),
        FilterValue::Number(n) => field.as_f64() == Some(*n),
        FilterValue::Flag(b) => field.as_bool() == Some(*b),
        FilterValue::List(values) => field
            .as_str()
            .map(|s| values.iter().any(|v| v == s))
            .unwrap_or(false),
        FilterValue::DateRange { .. } => true,
    }
}

/// Fixture-backed source used by tests and local development.
pub struct MemoryDataSource {
    rows: Vec<Value>,
}

impl MemoryDataSource {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn extract(
        &self,
        _config: &DataSourceConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<Vec<Value>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| filters.iter().all(|f| filter_matches_row(row, f)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use traffboard_core::types::DataSourceType;

    fn source_config() -> DataSourceConfig {
        DataSourceConfig {
            id: "src".into(),
            source_type: DataSourceType::Memory,
            connection_string: String::new(),
            timeout_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_memory_source_applies_equality_filters() {
        let source = MemoryDataSource::new(vec![
            json!({ "partner": "p1", "clicks": 10 }),
            json!({ "partner": "p2", "clicks": 20 }),
        ]);

        let filters = vec![AppliedFilter {
            id: "partner".into(),
            value: FilterValue::Text("p2".into()),
        }];

        let rows = source.extract(&source_config(), &filters).await.expect("extract");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["clicks"], 20);
    }

    #[test]
    fn test_list_filter_matches_membership() {
        let row = json!({ "country": "DE" });
        let filter = AppliedFilter {
            id: "country".into(),
            value: FilterValue::List(vec!["DE".into(), "AT".into()]),
        };
        assert!(filter_matches_row(&row, &filter));

        let miss = AppliedFilter {
            id: "country".into(),
            value: FilterValue::List(vec!["FR".into()]),
        };
        assert!(!filter_matches_row(&row, &miss));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let row = json!({ "country": "DE" });
        let filter = AppliedFilter {
            id: "device".into(),
            value: FilterValue::Text("mobile".into()),
        };
        assert!(!filter_matches_row(&row, &filter));
    }
}
