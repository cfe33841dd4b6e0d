//! Report data pipeline: cache management, extraction, transformation,
//! and end-to-end pipeline execution.

pub mod builder;
pub mod cache;
pub mod extract;
pub mod factory;
pub mod manager;
pub mod transform;

pub use builder::TransformBuilder;
pub use cache::{CacheManager, CacheStats};
pub use extract::{DataSource, MemoryDataSource};
pub use factory::{create_cohort_pipeline, create_conversion_pipeline, validate_pipeline};
pub use manager::{
    create_pipeline_manager_with_defaults, PipelineExecutionOptions, PipelineManager,
};
pub use transform::apply_transform;
