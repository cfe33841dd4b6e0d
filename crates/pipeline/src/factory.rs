//! Factory functions for the default pipelines and the multi-part
//! pipeline validator.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::json;

use traffboard_core::types::{
    CacheConfig, CacheStrategy, DataPipeline, DataSourceConfig, DataSourceType, DataTransformStep,
    OutputConfig, OutputFormat,
};

use crate::builder::TransformBuilder;

/// Conversion report pipeline: short cache, light transforms.
pub fn create_conversion_pipeline(id: &str) -> DataPipeline {
    let source = DataSourceConfig {
        id: format!("source_{id}"),
        source_type: DataSourceType::Database,
        connection_string: String::new(),
        timeout_ms: 30_000,
    };

    let transforms = TransformBuilder::new().filter(json!({})).build();

    DataPipeline {
        id: id.to_string(),
        source,
        transforms,
        cache: CacheConfig {
            enabled: true,
            ttl_secs: 300,
            strategy: CacheStrategy::Memory,
            invalidation_rules: Vec::new(),
        },
        output: OutputConfig {
            format: OutputFormat::Json,
        },
    }
}

/// Cohort analysis pipeline. Cached longer than conversions since the
/// source aggregation is expensive and the data changes less often.
pub fn create_cohort_pipeline(id: &str) -> DataPipeline {
    let source = DataSourceConfig {
        id: format!("source_{id}"),
        source_type: DataSourceType::Database,
        connection_string: String::new(),
        // Longer timeout for the heavy aggregation query.
        timeout_ms: 60_000,
    };

    let transforms = TransformBuilder::new()
        .cohort(json!({ "date_field": "first_deposit_date", "mode": "day" }))
        .aggregate(
            &["cohort_date"],
            json!({ "players": "count", "deposits_sum": "sum" }),
        )
        .build();

    DataPipeline {
        id: id.to_string(),
        source,
        transforms,
        cache: CacheConfig {
            enabled: true,
            ttl_secs: 1800,
            strategy: CacheStrategy::Memory,
            invalidation_rules: Vec::new(),
        },
        output: OutputConfig {
            format: OutputFormat::Json,
        },
    }
}

// ─── Validation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

fn validate_basic_fields(pipeline: &DataPipeline) -> Vec<String> {
    let mut errors = Vec::new();

    if pipeline.id.trim().is_empty() {
        errors.push("Pipeline ID is required".to_string());
    }

    errors
}

fn validate_source_config(source: &DataSourceConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if source.source_type == DataSourceType::Api && source.connection_string.is_empty() {
        errors.push("Connection string is required for API sources".to_string());
    }

    errors
}

fn validate_transforms(transforms: &[DataTransformStep]) -> Vec<String> {
    let mut errors = Vec::new();

    for (index, transform) in transforms.iter().enumerate() {
        if transform.id.is_empty() {
            errors.push(format!("Transform {index}: ID is required"));
        }
        if !transform.config.is_object() {
            errors.push(format!("Transform {index}: Config must be an object"));
        }
    }

    let unique_ids: HashSet<&str> = transforms.iter().map(|t| t.id.as_str()).collect();
    if unique_ids.len() != transforms.len() {
        errors.push("Transform IDs must be unique".to_string());
    }

    let unique_orders: HashSet<u32> = transforms.iter().map(|t| t.order).collect();
    if unique_orders.len() != transforms.len() {
        errors.push("Transform orders must be unique".to_string());
    }

    errors
}

fn validate_cache_config(cache: &CacheConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if cache.enabled && cache.ttl_secs == 0 {
        errors.push("Cache TTL must be positive when caching is enabled".to_string());
    }

    errors
}

/// Validate a pipeline definition, accumulating every violation rather
/// than failing fast.
pub fn validate_pipeline(pipeline: &DataPipeline) -> PipelineValidation {
    let mut errors = Vec::new();

    errors.extend(validate_basic_fields(pipeline));
    errors.extend(validate_source_config(&pipeline.source));
    errors.extend(validate_transforms(&pipeline.transforms));
    errors.extend(validate_cache_config(&pipeline.cache));

    PipelineValidation {
        valid: errors.is_empty(),
        errors,
    }
}
