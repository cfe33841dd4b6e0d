//! Transform step application: filter, aggregate, cohort bucketing, and
//! custom passthrough steps applied in pipeline order.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{Map, Value};
use tracing::debug;

use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::{AppliedFilter, DataTransformStep, TransformType};

use crate::extract::filter_matches_row;

/// Apply a single transform step to the row set.
pub fn apply_transform(
    rows: Vec<Value>,
    step: &DataTransformStep,
    filters: &[AppliedFilter],
) -> ReportResult<Vec<Value>> {
    match step.transform_type {
        TransformType::Filter => apply_filter(rows, step, filters),
        TransformType::Aggregate => apply_aggregate(rows, step),
        TransformType::Cohort => apply_cohort(rows, step),
        TransformType::Custom => apply_custom(rows, step),
    }
}

/// Retain rows matching the step's `conditions` map and every applied
/// filter (equality semantics).
fn apply_filter(
    rows: Vec<Value>,
    step: &DataTransformStep,
    filters: &[AppliedFilter],
) -> ReportResult<Vec<Value>> {
    let conditions = step
        .config
        .get("conditions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(rows
        .into_iter()
        .filter(|row| {
            conditions.iter().all(|(field, expected)| row.get(field) == Some(expected))
                && filters.iter().all(|f| filter_matches_row(row, f))
        })
        .collect())
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    seen: bool,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if !self.seen {
            self.min = value;
            self.max = value;
            self.seen = true;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    fn finish(&self, op: &str) -> Value {
        match op {
            "count" => Value::from(self.count),
            "sum" => Value::from(self.sum),
            "avg" if self.count > 0 => Value::from(self.sum / self.count as f64),
            "min" if self.seen => Value::from(self.min),
            "max" if self.seen => Value::from(self.max),
            _ => Value::Null,
        }
    }
}

/// Grouped fold: `group_by` fields key the groups, `aggregates` maps a
/// field to one of sum | count | avg | min | max.
fn apply_aggregate(rows: Vec<Value>, step: &DataTransformStep) -> ReportResult<Vec<Value>> {
    let group_by: Vec<String> = step
        .config
        .get("group_by")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let aggregates: Vec<(String, String)> = step
        .config
        .get("aggregates")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(field, op)| op.as_str().map(|op| (field.clone(), op.to_string())))
                .collect()
        })
        .unwrap_or_default();

    if aggregates.is_empty() {
        return Err(ReportError::execution(
            format!("Transform \"{}\"", step.id).as_str(),
            "aggregate step requires an aggregates map",
        ));
    }

    // Group key is the ordered tuple of group-by values.
    let mut groups: BTreeMap<String, (Vec<(String, Value)>, Vec<Accumulator>)> = BTreeMap::new();

    for row in &rows {
        let key_fields: Vec<(String, Value)> = group_by
            .iter()
            .map(|field| (field.clone(), row.get(field).cloned().unwrap_or(Value::Null)))
            .collect();
        let key = serde_json::to_string(&key_fields.iter().map(|(_, v)| v).collect::<Vec<_>>())?;

        let entry = groups
            .entry(key)
            .or_insert_with(|| (key_fields, aggregates.iter().map(|_| Accumulator::default()).collect()));

        for (i, (field, op)) in aggregates.iter().enumerate() {
            if op == "count" {
                entry.1[i].push(0.0);
            } else if let Some(value) = row.get(field).and_then(Value::as_f64) {
                entry.1[i].push(value);
            }
        }
    }

    let output = groups
        .into_values()
        .map(|(key_fields, accumulators)| {
            let mut object = Map::new();
            for (field, value) in key_fields {
                object.insert(field, value);
            }
            for ((field, op), accumulator) in aggregates.iter().zip(&accumulators) {
                object.insert(field.clone(), accumulator.finish(op));
            }
            Value::Object(object)
        })
        .collect();

    Ok(output)
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Annotate each row with a `cohort_date` bucketed from the configured
/// date field. Rows without a parsable date cannot join a cohort and are
/// dropped.
fn apply_cohort(rows: Vec<Value>, step: &DataTransformStep) -> ReportResult<Vec<Value>> {
    let date_field = step
        .config
        .get("date_field")
        .and_then(Value::as_str)
        .unwrap_or("date")
        .to_string();
    let weekly = step.config.get("mode").and_then(Value::as_str) == Some("week");

    let mut output = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for mut row in rows {
        let parsed = row
            .get(&date_field)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok());

        match parsed {
            Some(date) => {
                let bucket = if weekly { week_start(date) } else { date };
                if let Some(object) = row.as_object_mut() {
                    object.insert("cohort_date".into(), Value::from(bucket.to_string()));
                }
                output.push(row);
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(step = %step.id, dropped = dropped, "Rows without cohort date dropped");
    }

    Ok(output)
}

/// Custom steps pass rows through; a `limit` config caps the row count.
fn apply_custom(mut rows: Vec<Value>, step: &DataTransformStep) -> ReportResult<Vec<Value>> {
    if let Some(limit) = step.config.get("limit").and_then(Value::as_u64) {
        rows.truncate(limit as usize);
    }
    Ok(rows)
}
