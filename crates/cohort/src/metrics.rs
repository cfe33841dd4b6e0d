//! The four cohort business metrics, computed from pre-aggregated sums.
//!
//! - DEP2COST: (cumulative deposits / acquisition costs) * 100
//! - ROAS: (cumulative NGR / acquisition costs) * 100
//! - AVG DEPOSIT SUM: cumulative deposits / cohort size
//! - RETENTION RATE: active players / cohort size * 100
//!
//! Undefined inputs (zero denominators) are values, not errors: the caller
//! gets `None` and a placeholder rendering.

use std::collections::BTreeMap;

use traffboard_core::types::CohortMetric;

/// Placeholder shown for metrics that are undefined for their input.
pub const UNDEFINED_DISPLAY: &str = "\u{2014}";

/// Aggregates a metric is computed from, for one cohort at one breakpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricInput {
    pub active_players: f64,
    pub deposit_sum: f64,
    pub ngr_sum: f64,
    pub cost_sum: f64,
    pub cohort_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub value: Option<f64>,
    pub raw_value: f64,
    pub formatted: String,
    pub is_valid: bool,
}

impl MetricResult {
    fn undefined() -> Self {
        Self {
            value: None,
            raw_value: 0.0,
            formatted: UNDEFINED_DISPLAY.to_string(),
            is_valid: false,
        }
    }

    fn percent(raw_value: f64) -> Self {
        Self {
            value: Some(raw_value),
            raw_value,
            formatted: format!("{raw_value:.1}%"),
            is_valid: true,
        }
    }

    fn currency(raw_value: f64) -> Self {
        Self {
            value: Some(raw_value),
            raw_value,
            formatted: format!("${raw_value:.2}"),
            is_valid: true,
        }
    }
}

fn dep2cost(deposit_sum: f64, cost_sum: f64) -> MetricResult {
    if cost_sum <= 0.0 {
        return MetricResult::undefined();
    }
    MetricResult::percent((deposit_sum / cost_sum) * 100.0)
}

fn roas(ngr_sum: f64, cost_sum: f64) -> MetricResult {
    if cost_sum <= 0.0 {
        return MetricResult::undefined();
    }
    MetricResult::percent((ngr_sum / cost_sum) * 100.0)
}

fn avg_deposit_sum(deposit_sum: f64, cohort_size: f64) -> MetricResult {
    if cohort_size <= 0.0 {
        return MetricResult::undefined();
    }
    MetricResult::currency(deposit_sum / cohort_size)
}

fn retention_rate(active_players: f64, cohort_size: f64) -> MetricResult {
    if cohort_size <= 0.0 {
        return MetricResult::undefined();
    }
    MetricResult::percent((active_players / cohort_size) * 100.0)
}

/// Metric value for one breakpoint, `None` where undefined.
pub fn calculate_cohort_metric(metric: CohortMetric, input: &MetricInput) -> Option<f64> {
    calculate_detailed_metric(metric, input).value
}

/// Full metric result with formatting. The match is exhaustive over
/// [`CohortMetric`], so an unknown metric cannot reach runtime.
pub fn calculate_detailed_metric(metric: CohortMetric, input: &MetricInput) -> MetricResult {
    match metric {
        CohortMetric::Dep2Cost => dep2cost(input.deposit_sum, input.cost_sum),
        CohortMetric::Roas => roas(input.ngr_sum, input.cost_sum),
        CohortMetric::AvgDepositSum => avg_deposit_sum(input.deposit_sum, input.cohort_size),
        CohortMetric::RetentionRate => retention_rate(input.active_players, input.cohort_size),
    }
}

/// All four metrics for one input.
pub fn calculate_all_metrics(input: &MetricInput) -> BTreeMap<CohortMetric, MetricResult> {
    [
        CohortMetric::Dep2Cost,
        CohortMetric::Roas,
        CohortMetric::AvgDepositSum,
        CohortMetric::RetentionRate,
    ]
    .into_iter()
    .map(|metric| (metric, calculate_detailed_metric(metric, input)))
    .collect()
}

/// Render an already-computed metric value the way the detailed
/// calculation would.
pub fn format_metric_value(metric: CohortMetric, value: Option<f64>) -> String {
    match (metric, value) {
        (_, None) => UNDEFINED_DISPLAY.to_string(),
        (CohortMetric::AvgDepositSum, Some(v)) => format!("${v:.2}"),
        (_, Some(v)) => format!("{v:.1}%"),
    }
}

pub fn display_name(metric: CohortMetric) -> &'static str {
    match metric {
        CohortMetric::Dep2Cost => "DEP2COST",
        CohortMetric::Roas => "ROAS",
        CohortMetric::AvgDepositSum => "AVG DEPOSIT SUM",
        CohortMetric::RetentionRate => "RETENTION RATE",
    }
}

pub fn description(metric: CohortMetric) -> &'static str {
    match metric {
        CohortMetric::Dep2Cost => "Deposits relative to acquisition costs",
        CohortMetric::Roas => "Return on ad spend",
        CohortMetric::AvgDepositSum => "Average deposit sum per cohort member",
        CohortMetric::RetentionRate => "Share of cohort members still active",
    }
}

pub fn unit(metric: CohortMetric) -> &'static str {
    match metric {
        CohortMetric::Dep2Cost | CohortMetric::Roas | CohortMetric::RetentionRate => "%",
        CohortMetric::AvgDepositSum => "$",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricInputValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Validate metric input, accumulating every violated rule.
pub fn validate_metric_input(input: &MetricInput) -> MetricInputValidation {
    let mut errors = Vec::new();

    if input.cohort_size < 0.0 {
        errors.push("Cohort size cannot be negative".to_string());
    }
    if input.active_players < 0.0 {
        errors.push("Active players cannot be negative".to_string());
    }
    if input.active_players > input.cohort_size {
        errors.push("Active players cannot exceed cohort size".to_string());
    }
    if input.deposit_sum < 0.0 {
        errors.push("Deposit sum cannot be negative".to_string());
    }
    if input.cost_sum < 0.0 {
        errors.push("Cost sum cannot be negative".to_string());
    }
    if input.ngr_sum < 0.0 {
        errors.push("NGR sum cannot be negative".to_string());
    }

    MetricInputValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dep2cost_exact_value() {
        let input = MetricInput {
            deposit_sum: 500.0,
            cost_sum: 1000.0,
            ..Default::default()
        };
        let result = calculate_detailed_metric(CohortMetric::Dep2Cost, &input);
        assert_eq!(result.value, Some(50.0));
        assert_eq!(result.formatted, "50.0%");
        assert!(result.is_valid);
    }

    #[test]
    fn test_zero_cost_is_undefined_not_an_error() {
        let input = MetricInput {
            deposit_sum: 500.0,
            cost_sum: 0.0,
            ..Default::default()
        };
        for metric in [CohortMetric::Dep2Cost, CohortMetric::Roas] {
            let result = calculate_detailed_metric(metric, &input);
            assert_eq!(result.value, None);
            assert!(!result.is_valid);
            assert_eq!(result.formatted, UNDEFINED_DISPLAY);
        }
    }

    #[test]
    fn test_zero_cohort_size_is_undefined() {
        let input = MetricInput {
            deposit_sum: 100.0,
            active_players: 10.0,
            cohort_size: 0.0,
            ..Default::default()
        };
        for metric in [CohortMetric::AvgDepositSum, CohortMetric::RetentionRate] {
            let result = calculate_detailed_metric(metric, &input);
            assert_eq!(result.value, None);
            assert!(!result.is_valid);
        }
    }

    #[test]
    fn test_currency_formatting() {
        let input = MetricInput {
            deposit_sum: 1234.5,
            cohort_size: 100.0,
            ..Default::default()
        };
        let result = calculate_detailed_metric(CohortMetric::AvgDepositSum, &input);
        assert_eq!(result.formatted, "$12.35");
    }

    #[test]
    fn test_retention_rate_percentage() {
        let input = MetricInput {
            active_players: 25.0,
            cohort_size: 200.0,
            ..Default::default()
        };
        let result = calculate_detailed_metric(CohortMetric::RetentionRate, &input);
        assert_eq!(result.value, Some(12.5));
        assert_eq!(result.formatted, "12.5%");
    }

    #[test]
    fn test_all_metrics_cover_every_variant() {
        let input = MetricInput {
            active_players: 10.0,
            deposit_sum: 100.0,
            ngr_sum: 80.0,
            cost_sum: 50.0,
            cohort_size: 40.0,
        };
        let all = calculate_all_metrics(&input);
        assert_eq!(all.len(), 4);
        assert!(all.values().all(|r| r.is_valid));
    }

    #[test]
    fn test_validation_accumulates_violations() {
        let input = MetricInput {
            cohort_size: -5.0,
            active_players: 10.0,
            deposit_sum: -1.0,
            cost_sum: -1.0,
            ngr_sum: -1.0,
        };
        let validation = validate_metric_input(&input);
        assert!(!validation.is_valid);
        assert!(validation.errors.len() >= 4, "errors: {:?}", validation.errors);
    }
}
