//! Presentation shaping for cohort output: stable row ordering, the full
//! configured breakpoint set on every row, display labels.

use traffboard_core::types::{CohortData, CohortMetric, CohortMode};

use crate::metrics::format_metric_value;

/// Normalize processed rows for presentation: rows sorted by cohort date,
/// every configured breakpoint present as a key (absent ones as `None`).
pub fn format_cohort_results(mut rows: Vec<CohortData>, breakpoints: &[u32]) -> Vec<CohortData> {
    for row in &mut rows {
        for &bp in breakpoints {
            row.breakpoint_values.entry(bp).or_insert(None);
        }
    }
    rows.sort_by_key(|row| row.cohort_date);
    rows
}

/// Human-readable label for a breakpoint offset.
pub fn breakpoint_label(mode: CohortMode, breakpoint: u32) -> String {
    match mode {
        CohortMode::Day => format!("Day {breakpoint}"),
        CohortMode::Week => format!("Week {breakpoint}"),
    }
}

/// One presentation-ready cell of a cohort row.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedBreakpoint {
    pub breakpoint: u32,
    pub label: String,
    pub value: Option<f64>,
    pub formatted: String,
}

/// Expand a row's breakpoint map into labeled, formatted cells in the
/// configured breakpoint order.
pub fn format_breakpoint_cells(
    row: &CohortData,
    metric: CohortMetric,
    mode: CohortMode,
    breakpoints: &[u32],
) -> Vec<FormattedBreakpoint> {
    breakpoints
        .iter()
        .map(|&bp| {
            let value = row.breakpoint_values.get(&bp).copied().flatten();
            FormattedBreakpoint {
                breakpoint: bp,
                label: breakpoint_label(mode, bp),
                value,
                formatted: format_metric_value(metric, value),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn row(day: u32, values: &[(u32, Option<f64>)]) -> CohortData {
        CohortData {
            cohort_date: NaiveDate::from_ymd_opt(2025, 1, day).expect("date"),
            ftd_count: 1,
            breakpoint_values: values.iter().copied().collect(),
            weighted_average: None,
        }
    }

    #[test]
    fn test_results_sorted_and_backfilled() {
        let rows = vec![row(20, &[(7, Some(1.0))]), row(5, &[])];
        let formatted = format_cohort_results(rows, &[1, 7]);

        assert_eq!(formatted[0].cohort_date.to_string(), "2025-01-05");
        let keys: Vec<u32> = formatted[0].breakpoint_values.keys().copied().collect();
        assert_eq!(keys, vec![1, 7]);
        assert_eq!(formatted[1].breakpoint_values[&1], None);
        assert_eq!(formatted[1].breakpoint_values[&7], Some(1.0));
    }

    #[test]
    fn test_cells_carry_labels_and_formatting() {
        let data = row(5, &[(7, Some(42.5)), (14, None)]);
        let cells = format_breakpoint_cells(&data, CohortMetric::Roas, CohortMode::Day, &[7, 14]);

        assert_eq!(cells[0].label, "Day 7");
        assert_eq!(cells[0].formatted, "42.5%");
        assert_eq!(cells[1].formatted, "\u{2014}");
    }

    #[test]
    fn test_week_labels() {
        assert_eq!(breakpoint_label(CohortMode::Week, 4), "Week 4");
    }
}
