//! Filter definition composer and value validation.

use std::collections::BTreeMap;

use crate::types::{FilterDefinition, FilterOption, FilterType, FilterValue};

// ─── Common filter presets ──────────────────────────────────────────────────

pub mod common {
    use super::*;

    pub fn date_range() -> FilterDefinition {
        FilterDefinition {
            id: "dateRange".into(),
            label: "Date Range".into(),
            filter_type: FilterType::DateRange,
            group: Some("time".into()),
            order: Some(0),
            required: false,
            placeholder: None,
            options: Vec::new(),
            validation: None,
        }
    }

    pub fn partner_id() -> FilterDefinition {
        FilterDefinition {
            id: "partnerId".into(),
            label: "Partner".into(),
            filter_type: FilterType::Select,
            group: Some("general".into()),
            order: Some(10),
            required: false,
            placeholder: None,
            options: vec![
                FilterOption {
                    label: "Partner A".into(),
                    value: "partner_a".into(),
                },
                FilterOption {
                    label: "Partner B".into(),
                    value: "partner_b".into(),
                },
            ],
            validation: None,
        }
    }

    pub fn search() -> FilterDefinition {
        FilterDefinition {
            id: "search".into(),
            label: "Search".into(),
            filter_type: FilterType::Text,
            group: Some("general".into()),
            order: Some(20),
            required: false,
            placeholder: Some("Search...".into()),
            options: Vec::new(),
            validation: None,
        }
    }

    pub fn traffic_source() -> FilterDefinition {
        FilterDefinition {
            id: "trafficSource".into(),
            label: "Traffic Source".into(),
            filter_type: FilterType::Select,
            group: Some("analytics".into()),
            order: Some(30),
            required: false,
            placeholder: None,
            options: ["organic", "direct", "referral", "social"]
                .iter()
                .map(|s| FilterOption {
                    label: {
                        let mut label = s.to_string();
                        label[..1].make_ascii_uppercase();
                        label
                    },
                    value: s.to_string(),
                })
                .collect(),
            validation: None,
        }
    }
}

// ─── Filter composer ────────────────────────────────────────────────────────

/// Builder for filter definition sets. Duplicate ids replace in place;
/// `build` orders by (group, order) with absent groups sorting last.
#[derive(Debug, Default)]
pub struct FilterComposer {
    filters: Vec<FilterDefinition>,
}

impl FilterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, filter: FilterDefinition) -> Self {
        match self.filters.iter().position(|f| f.id == filter.id) {
            Some(index) => self.filters[index] = filter,
            None => self.filters.push(filter),
        }
        self
    }

    pub fn add_all(mut self, filters: impl IntoIterator<Item = FilterDefinition>) -> Self {
        for filter in filters {
            self = self.add(filter);
        }
        self
    }

    pub fn build(self) -> Vec<FilterDefinition> {
        let mut filters = self.filters;
        filters.sort_by(|a, b| {
            let group_a = a.group.as_deref().unwrap_or("zzz");
            let group_b = b.group.as_deref().unwrap_or("zzz");
            group_a
                .cmp(group_b)
                .then_with(|| a.order.unwrap_or(u32::MAX).cmp(&b.order.unwrap_or(u32::MAX)))
        });
        filters
    }

    pub fn reset(mut self) -> Self {
        self.filters.clear();
        self
    }
}

// ─── Value validation ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FilterValidation {
    pub valid: bool,
    /// Error message per offending filter id.
    pub errors: BTreeMap<String, String>,
}

fn is_empty_value(value: Option<&FilterValue>) -> bool {
    match value {
        None => true,
        Some(FilterValue::Text(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn validate_pattern(value: &FilterValue, pattern: &str, label: &str) -> Option<String> {
    let FilterValue::Text(text) = value else {
        return None;
    };
    match regex::Regex::new(pattern) {
        Ok(re) if re.is_match(text) => None,
        Ok(_) => Some(format!("{label} format is invalid")),
        // Invalid stored pattern is a validation failure, not a panic.
        Err(_) => Some(format!("{label} format validation error")),
    }
}

fn validate_range(
    value: &FilterValue,
    min: Option<f64>,
    max: Option<f64>,
    label: &str,
) -> Option<String> {
    let FilterValue::Number(n) = value else {
        return None;
    };
    if let Some(min) = min {
        if *n < min {
            return Some(format!("{label} must be at least {min}"));
        }
    }
    if let Some(max) = max {
        if *n > max {
            return Some(format!("{label} must be at most {max}"));
        }
    }
    None
}

/// Validate a single value against its definition. Returns the error
/// message, or `None` when the value passes.
pub fn validate_filter_value(
    value: Option<&FilterValue>,
    definition: &FilterDefinition,
) -> Option<String> {
    if definition.required && is_empty_value(value) {
        return Some(format!("{} is required", definition.label));
    }

    let Some(value) = value else {
        // Missing values are fine for non-required filters.
        return None;
    };

    if let Some(rules) = &definition.validation {
        if let Some(pattern) = &rules.pattern {
            if let Some(error) = validate_pattern(value, pattern, &definition.label) {
                return Some(error);
            }
        }
        if let Some(error) = validate_range(value, rules.min, rules.max, &definition.label) {
            return Some(error);
        }
    }

    None
}

/// Validate a value map against a definition set, accumulating every
/// violation rather than stopping at the first.
pub fn validate_filters(
    values: &BTreeMap<String, FilterValue>,
    definitions: &[FilterDefinition],
) -> FilterValidation {
    let mut errors = BTreeMap::new();

    for definition in definitions {
        if let Some(error) = validate_filter_value(values.get(&definition.id), definition) {
            errors.insert(definition.id.clone(), error);
        }
    }

    FilterValidation {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterValidationRules;

    fn text_filter(id: &str, required: bool) -> FilterDefinition {
        FilterDefinition {
            id: id.into(),
            label: id.into(),
            filter_type: FilterType::Text,
            group: None,
            order: None,
            required,
            placeholder: None,
            options: Vec::new(),
            validation: None,
        }
    }

    #[test]
    fn test_composer_last_write_wins() {
        let mut replacement = text_filter("search", false);
        replacement.label = "Replaced".into();

        let filters = FilterComposer::new()
            .add(common::search())
            .add(replacement)
            .build();

        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].label, "Replaced");
    }

    #[test]
    fn test_composer_orders_by_group_then_order() {
        let filters = FilterComposer::new()
            .add(common::traffic_source())
            .add(text_filter("ungrouped", false))
            .add(common::date_range())
            .add(common::partner_id())
            .build();

        let ids: Vec<&str> = filters.iter().map(|f| f.id.as_str()).collect();
        // analytics < general < time < (no group)
        assert_eq!(ids, ["trafficSource", "partnerId", "dateRange", "ungrouped"]);
    }

    #[test]
    fn test_required_filter_rejects_empty_text() {
        let definition = text_filter("partner", true);
        let error = validate_filter_value(Some(&FilterValue::Text(String::new())), &definition);
        assert_eq!(error, Some("partner is required".into()));
        assert!(validate_filter_value(None, &definition).is_some());
    }

    #[test]
    fn test_pattern_and_range_rules() {
        let mut definition = text_filter("code", false);
        definition.validation = Some(FilterValidationRules {
            min: None,
            max: None,
            pattern: Some("^[a-z]+$".into()),
        });
        assert!(validate_filter_value(Some(&FilterValue::Text("abc".into())), &definition).is_none());
        assert!(validate_filter_value(Some(&FilterValue::Text("AB1".into())), &definition).is_some());

        let mut numeric = text_filter("limit", false);
        numeric.filter_type = FilterType::Number;
        numeric.validation = Some(FilterValidationRules {
            min: Some(1.0),
            max: Some(10.0),
            pattern: None,
        });
        assert!(validate_filter_value(Some(&FilterValue::Number(5.0)), &numeric).is_none());
        assert!(validate_filter_value(Some(&FilterValue::Number(11.0)), &numeric).is_some());
    }

    #[test]
    fn test_validate_filters_accumulates() {
        let definitions = vec![text_filter("a", true), text_filter("b", true)];
        let result = validate_filters(&BTreeMap::new(), &definitions);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_invalid_stored_pattern_fails_value() {
        let mut definition = text_filter("code", false);
        definition.validation = Some(FilterValidationRules {
            min: None,
            max: None,
            pattern: Some("([unclosed".into()),
        });
        let error = validate_filter_value(Some(&FilterValue::Text("abc".into())), &definition);
        assert_eq!(error, Some("code format validation error".into()));
    }
}
