//! ClickHouse query assembly for the report engine's two heavy reads: the
//! per-breakpoint cohort aggregation and raw conversion extraction.

use traffboard_core::types::{AppliedFilter, CohortConfig, CohortMode, FilterValue};

/// Escape a string literal for interpolation into a ClickHouse query.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Column name for a filter id: camelCase filter ids map onto snake_case
/// store columns.
fn column_for(filter_id: &str) -> String {
    let mut column = String::with_capacity(filter_id.len() + 4);
    for c in filter_id.chars() {
        if c.is_ascii_uppercase() {
            column.push('_');
            column.push(c.to_ascii_lowercase());
        } else {
            column.push(c);
        }
    }
    column
}

fn filter_condition(filter: &AppliedFilter) -> Option<String> {
    let column = column_for(&filter.id);
    match &filter.value {
        FilterValue::Text(s) => Some(format!("{column} = '{}'", escape(s))),
        FilterValue::Number(n) => Some(format!("{column} = {n}")),
        FilterValue::Flag(b) => Some(format!("{column} = {}", u8::from(*b))),
        FilterValue::List(values) => {
            if values.is_empty() {
                return None;
            }
            let list = values
                .iter()
                .map(|v| format!("'{}'", escape(v)))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("{column} IN ({list})"))
        }
        FilterValue::DateRange { start, end } => {
            Some(format!("{column} BETWEEN '{start}' AND '{end}'"))
        }
    }
}

fn where_clause(config: &CohortConfig, filters: &[AppliedFilter]) -> String {
    let mut conditions = vec![format!(
        "first_deposit_date BETWEEN '{}' AND '{}'",
        config.date_range.start, config.date_range.end
    )];
    conditions.extend(filters.iter().filter_map(filter_condition));
    conditions.join("\n  AND ")
}

fn offset_days(mode: CohortMode, breakpoint: u32) -> u32 {
    match mode {
        CohortMode::Day => breakpoint,
        CohortMode::Week => breakpoint * 7,
    }
}

/// Cohort base-data query in the engine's wire convention: one row per
/// cohort acquisition date with `cohortDate`, `cohortSize`, and the four
/// `day{N}_*` aggregate columns per breakpoint. Output rows parse with
/// `CohortBaseRow::from_wire`.
pub fn build_cohort_base_query(
    table: &str,
    config: &CohortConfig,
    filters: &[AppliedFilter],
) -> String {
    let mut columns = vec![
        "toString(toDate(first_deposit_date)) AS cohortDate".to_string(),
        "toFloat64(uniqExact(player_id)) AS cohortSize".to_string(),
    ];

    for &bp in &config.breakpoints {
        let offset = offset_days(config.mode, bp);
        let window = format!("date <= first_deposit_date + INTERVAL {offset} DAY");
        columns.push(format!(
            "toFloat64(uniqExactIf(player_id, {window} AND deposits_sum > 0)) AS day{bp}_active_players"
        ));
        columns.push(format!(
            "sumIf(deposits_sum, {window}) AS day{bp}_deposit_sum"
        ));
        columns.push(format!(
            "sumIf(casino_real_ngr, {window}) AS day{bp}_ngr_sum"
        ));
        columns.push(format!(
            "sumIf(fixed_per_player, {window}) AS day{bp}_cost_sum"
        ));
    }

    format!(
        "SELECT\n  {}\nFROM {table}\nWHERE {}\nGROUP BY cohortDate\nORDER BY cohortDate\nFORMAT JSONEachRow",
        columns.join(",\n  "),
        where_clause(config, filters)
    )
}

/// Same aggregation reshaped for the typed client path: one row per
/// (cohort date, breakpoint) via arrayJoin, fixed seven columns.
pub fn build_cohort_slice_query(
    table: &str,
    config: &CohortConfig,
    filters: &[AppliedFilter],
) -> String {
    let slices = config
        .breakpoints
        .iter()
        .map(|&bp| {
            let offset = offset_days(config.mode, bp);
            let window = format!("date <= first_deposit_date + INTERVAL {offset} DAY");
            format!(
                "(toUInt32({bp}), \
                 toFloat64(uniqExactIf(player_id, {window} AND deposits_sum > 0)), \
                 toFloat64(sumIf(deposits_sum, {window})), \
                 toFloat64(sumIf(casino_real_ngr, {window})), \
                 toFloat64(sumIf(fixed_per_player, {window})))"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n      ");

    format!(
        "SELECT\n  cohort_date,\n  cohort_size,\n  slice.1 AS breakpoint,\n  slice.2 AS active_players,\n  slice.3 AS deposit_sum,\n  slice.4 AS ngr_sum,\n  slice.5 AS cost_sum\nFROM (\n  SELECT\n    toString(toDate(first_deposit_date)) AS cohort_date,\n    toFloat64(uniqExact(player_id)) AS cohort_size,\n    arrayJoin([\n      {slices}\n    ]) AS slice\n  FROM {table}\n  WHERE {}\n  GROUP BY cohort_date\n)\nORDER BY cohort_date, breakpoint",
        where_clause(config, filters)
    )
}

/// Raw conversion extraction with equality filters pushed down.
pub fn build_extraction_query(table: &str, filters: &[AppliedFilter]) -> String {
    let conditions: Vec<String> = filters.iter().filter_map(filter_condition).collect();
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", conditions.join("\n  AND "))
    };

    format!(
        "SELECT\n  toString(date) AS date,\n  foreign_partner_id,\n  foreign_campaign_id,\n  traffic_source,\n  device_type,\n  country,\n  all_clicks,\n  unique_clicks,\n  registrations_count,\n  ftd_count,\n  deposits_count\nFROM {table}{where_clause}\nORDER BY date DESC"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use traffboard_core::types::{CohortMetric, DateRange};

    fn config(mode: CohortMode, breakpoints: Vec<u32>) -> CohortConfig {
        CohortConfig {
            mode,
            metric: CohortMetric::RetentionRate,
            breakpoints,
            date_range: DateRange {
                start: NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
                end: NaiveDate::from_ymd_opt(2025, 3, 31).expect("date"),
            },
            filters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_base_query_emits_wire_columns() {
        let sql = build_cohort_base_query("player_activity", &config(CohortMode::Day, vec![7, 30]), &[]);
        assert!(sql.contains("AS cohortDate"));
        assert!(sql.contains("AS cohortSize"));
        assert!(sql.contains("AS day7_active_players"));
        assert!(sql.contains("AS day30_cost_sum"));
        assert!(sql.contains("INTERVAL 30 DAY"));
        assert!(sql.contains("FORMAT JSONEachRow"));
        assert!(sql.contains("first_deposit_date BETWEEN '2025-01-01' AND '2025-03-31'"));
    }

    #[test]
    fn test_week_mode_scales_offsets() {
        let sql = build_cohort_base_query("player_activity", &config(CohortMode::Week, vec![4]), &[]);
        // Week 4 spans 28 days but keeps the day4 column alias.
        assert!(sql.contains("INTERVAL 28 DAY"));
        assert!(sql.contains("AS day4_deposit_sum"));
    }

    #[test]
    fn test_filters_are_escaped_and_pushed_down() {
        let filters = vec![
            AppliedFilter {
                id: "partnerId".into(),
                value: FilterValue::Text("o'brien".into()),
            },
            AppliedFilter {
                id: "country".into(),
                value: FilterValue::List(vec!["DE".into(), "AT".into()]),
            },
        ];
        let sql = build_cohort_base_query("player_activity", &config(CohortMode::Day, vec![7]), &filters);
        assert!(sql.contains("partner_id = 'o''brien'"));
        assert!(sql.contains("country IN ('DE', 'AT')"));
    }

    #[test]
    fn test_slice_query_one_tuple_per_breakpoint() {
        let sql = build_cohort_slice_query("player_activity", &config(CohortMode::Day, vec![1, 7]), &[]);
        assert!(sql.contains("arrayJoin"));
        assert!(sql.contains("(toUInt32(1)"));
        assert!(sql.contains("(toUInt32(7)"));
        assert!(sql.contains("ORDER BY cohort_date, breakpoint"));
    }

    #[test]
    fn test_extraction_query_without_filters_has_no_where() {
        let sql = build_extraction_query("conversions", &[]);
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("FROM conversions"));
    }
}
