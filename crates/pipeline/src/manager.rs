//! Pipeline registry and end-to-end execution: extract, ordered
//! transforms, cache, retry.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::{
    AppliedFilter, CacheStatus, DataPipeline, DataSourceType, ReportData, ReportMetadata,
    DATA_VERSION,
};

use crate::cache::{CacheManager, CacheStats};
use crate::extract::DataSource;
use crate::factory::{create_cohort_pipeline, create_conversion_pipeline, validate_pipeline};
use crate::transform::apply_transform;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineExecutionOptions {
    pub skip_cache: bool,
    /// Overrides the source config's timeout; honored by sources that
    /// support per-request deadlines.
    pub timeout_ms: Option<u64>,
    pub max_rows: Option<usize>,
}

/// Owns the registered pipelines, their cache, and the data sources they
/// extract from. Construct one per application and inject it; tests get a
/// fresh instance each.
#[derive(Default)]
pub struct PipelineManager {
    pipelines: DashMap<String, DataPipeline>,
    sources: DashMap<DataSourceType, Arc<dyn DataSource>>,
    cache: CacheManager,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a data source implementation for a source type. Pipelines
    /// whose source type has no registered implementation fail at
    /// execution time.
    pub fn register_source(&self, source_type: DataSourceType, source: Arc<dyn DataSource>) {
        self.sources.insert(source_type, source);
    }

    /// Validate and store a pipeline. Re-registration replaces.
    pub fn register_pipeline(&self, pipeline: DataPipeline) -> ReportResult<()> {
        let validation = validate_pipeline(&pipeline);
        if !validation.valid {
            return Err(ReportError::InvalidPipeline(validation.errors));
        }

        debug!(pipeline = %pipeline.id, "Pipeline registered");
        self.pipelines.insert(pipeline.id.clone(), pipeline);
        Ok(())
    }

    /// Register the default conversion and cohort pipelines.
    pub fn register_default_pipelines(&self) -> ReportResult<()> {
        self.register_pipeline(create_conversion_pipeline("conversion_default"))?;
        self.register_pipeline(create_cohort_pipeline("cohort_default"))?;
        Ok(())
    }

    pub fn get_pipeline(&self, pipeline_id: &str) -> Option<DataPipeline> {
        self.pipelines.get(pipeline_id).map(|p| p.clone())
    }

    pub fn list_pipelines(&self) -> Vec<DataPipeline> {
        self.pipelines.iter().map(|p| p.clone()).collect()
    }

    pub fn remove_pipeline(&self, pipeline_id: &str) -> bool {
        self.pipelines.remove(pipeline_id).is_some()
    }

    /// Execute a registered pipeline: cache check, extraction, transforms
    /// in ascending order, cache write.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        filters: &[AppliedFilter],
        options: PipelineExecutionOptions,
    ) -> ReportResult<ReportData<Value>> {
        let pipeline = self
            .pipelines
            .get(pipeline_id)
            .map(|p| p.clone())
            .ok_or_else(|| ReportError::PipelineNotFound(pipeline_id.to_string()))?;

        let start = Instant::now();

        let cache_key = self.cache.generate_cache_key(pipeline_id, filters);
        let cached = self.cache.get_cached_data(&cache_key, &pipeline.cache);

        if let Some(mut hit) = cached.clone() {
            if !options.skip_cache {
                hit.metadata.cache_status = CacheStatus::Hit;
                hit.metadata.execution_time_ms = start.elapsed().as_millis() as u64;
                metrics::counter!("pipeline.cache_hits").increment(1);
                return Ok(hit);
            }
        }

        let source = self
            .sources
            .get(&pipeline.source.source_type)
            .map(|s| s.clone())
            .ok_or_else(|| {
                ReportError::Source(format!(
                    "No data source registered for {:?}",
                    pipeline.source.source_type
                ))
            })?;

        let raw_data = source
            .extract(&pipeline.source, filters)
            .await
            .map_err(|e| ReportError::execution(&format!("Pipeline \"{pipeline_id}\" extraction"), e))?;

        let mut transformed = raw_data;
        let mut steps = pipeline.transforms.clone();
        steps.sort_by_key(|s| s.order);
        for step in &steps {
            transformed = apply_transform(transformed, step, filters)
                .map_err(|e| ReportError::execution(&format!("Pipeline \"{pipeline_id}\" transform \"{}\"", step.id), e))?;
        }

        if let Some(max_rows) = options.max_rows {
            transformed.truncate(max_rows);
        }

        let total_count = transformed.len();
        let result = ReportData {
            rows: transformed,
            total_count,
            metadata: ReportMetadata {
                execution_time_ms: start.elapsed().as_millis() as u64,
                data_version: DATA_VERSION.to_string(),
                // `cached` is read before the skip_cache test above, so a
                // skip-cache run over a live entry reports Partial.
                cache_status: if cached.is_some() {
                    CacheStatus::Partial
                } else {
                    CacheStatus::Miss
                },
                last_refresh: Utc::now(),
                query_hash: cache_key.clone(),
                filters: filters.iter().map(|f| f.value.clone()).collect(),
            },
        };

        if pipeline.cache.enabled && !options.skip_cache {
            self.cache.set_cached_data(&cache_key, result.clone(), &pipeline.cache);
        }

        metrics::counter!("pipeline.executions").increment(1);
        Ok(result)
    }

    /// Execute with retries and exponential backoff (1s base, doubling).
    /// Failed attempts never write to the cache; only the normal
    /// cache-write path in `execute_pipeline` does.
    pub async fn execute_pipeline_with_retry(
        &self,
        pipeline_id: &str,
        filters: &[AppliedFilter],
        max_retries: u32,
    ) -> ReportResult<ReportData<Value>> {
        let mut last_error: Option<ReportError> = None;

        for attempt in 1..=max_retries {
            match self
                .execute_pipeline(pipeline_id, filters, PipelineExecutionOptions::default())
                .await
            {
                Ok(result) => return Ok(result),
                Err(error) => {
                    warn!(
                        pipeline = pipeline_id,
                        attempt = attempt,
                        error = %error,
                        "Pipeline execution attempt failed"
                    );
                    metrics::counter!("pipeline.retries").increment(1);
                    last_error = Some(error);

                    if attempt == max_retries {
                        break;
                    }

                    let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ReportError::RetriesExhausted {
            attempts: max_retries,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Clear cached results, optionally only keys matching a regex.
    /// Invalid patterns warn and leave the cache untouched.
    pub fn clear_cache(&self, pattern: Option<&str>) {
        self.cache.clear_cache(pattern);
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.get_cache_stats()
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("pipelines", &self.pipelines.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}

/// Convenience constructor wiring the default pipelines in one call.
pub fn create_pipeline_manager_with_defaults() -> ReportResult<PipelineManager> {
    let manager = PipelineManager::new();
    manager.register_default_pipelines()?;
    info!("Pipeline manager initialized with default pipelines");
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MemoryDataSource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use traffboard_core::types::{
        CacheConfig, CacheStrategy, DataSourceConfig, DataTransformStep, OutputConfig,
        TransformType,
    };

    fn memory_pipeline(id: &str, transforms: Vec<DataTransformStep>) -> DataPipeline {
        DataPipeline {
            id: id.to_string(),
            source: DataSourceConfig {
                id: format!("source_{id}"),
                source_type: DataSourceType::Memory,
                connection_string: String::new(),
                timeout_ms: 1000,
            },
            transforms,
            cache: CacheConfig {
                enabled: true,
                ttl_secs: 60,
                strategy: CacheStrategy::Memory,
                invalidation_rules: Vec::new(),
            },
            output: OutputConfig::default(),
        }
    }

    fn manager_with_rows(rows: Vec<Value>) -> PipelineManager {
        let manager = PipelineManager::new();
        manager.register_source(DataSourceType::Memory, Arc::new(MemoryDataSource::new(rows)));
        manager
    }

    fn step(id: &str, transform_type: TransformType, order: u32, config: Value) -> DataTransformStep {
        DataTransformStep {
            id: id.to_string(),
            transform_type,
            order,
            config,
        }
    }

    #[tokio::test]
    async fn test_unknown_pipeline_fails() {
        let manager = manager_with_rows(vec![]);
        let result = manager
            .execute_pipeline("missing", &[], PipelineExecutionOptions::default())
            .await;
        assert!(matches!(result, Err(ReportError::PipelineNotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_pipeline_rejected_at_registration() {
        let manager = manager_with_rows(vec![]);
        let mut pipeline = memory_pipeline("bad", vec![]);
        pipeline.id = String::new();
        let result = manager.register_pipeline(pipeline);
        assert!(matches!(result, Err(ReportError::InvalidPipeline(_))));
    }

    #[tokio::test]
    async fn test_execute_roundtrip_hits_cache() {
        let manager = manager_with_rows(vec![json!({ "clicks": 3 }), json!({ "clicks": 5 })]);
        manager
            .register_pipeline(memory_pipeline("conv", vec![]))
            .expect("register");

        let first = manager
            .execute_pipeline("conv", &[], PipelineExecutionOptions::default())
            .await
            .expect("first run");
        assert_eq!(first.metadata.cache_status, CacheStatus::Miss);
        assert_eq!(first.total_count, 2);

        let second = manager
            .execute_pipeline("conv", &[], PipelineExecutionOptions::default())
            .await
            .expect("second run");
        assert_eq!(second.metadata.cache_status, CacheStatus::Hit);
        assert_eq!(second.rows, first.rows);
    }

    #[tokio::test]
    async fn test_skip_cache_reports_partial_over_live_entry() {
        let manager = manager_with_rows(vec![json!({ "clicks": 1 })]);
        manager
            .register_pipeline(memory_pipeline("conv", vec![]))
            .expect("register");

        manager
            .execute_pipeline("conv", &[], PipelineExecutionOptions::default())
            .await
            .expect("warm cache");

        let skip = manager
            .execute_pipeline(
                "conv",
                &[],
                PipelineExecutionOptions {
                    skip_cache: true,
                    ..Default::default()
                },
            )
            .await
            .expect("skip-cache run");
        assert_eq!(skip.metadata.cache_status, CacheStatus::Partial);
    }

    #[tokio::test]
    async fn test_transforms_apply_in_ascending_order() {
        // Listed as [order 3, order 1, order 2]. Order 1 keeps group "a",
        // order 2 sums over it. Run in list order instead, the aggregate
        // would erase the "g" field first and the filter would drop
        // everything.
        let rows = (0..5)
            .map(|i| json!({ "n": i, "g": if i % 2 == 0 { "a" } else { "b" } }))
            .collect();
        let manager = manager_with_rows(rows);

        let transforms = vec![
            step("tail", TransformType::Custom, 3, json!({ "limit": 5 })),
            step(
                "keep_a",
                TransformType::Filter,
                1,
                json!({ "conditions": { "g": "a" } }),
            ),
            step(
                "sum_n",
                TransformType::Aggregate,
                2,
                json!({ "group_by": [], "aggregates": { "n": "sum" } }),
            ),
        ];

        manager
            .register_pipeline(memory_pipeline("ordered", transforms))
            .expect("register");

        let result = manager
            .execute_pipeline("ordered", &[], PipelineExecutionOptions::default())
            .await
            .expect("run");

        assert_eq!(result.total_count, 1);
        assert_eq!(result.rows[0]["n"], 6.0);
    }

    struct FlakySource {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl DataSource for FlakySource {
        async fn extract(
            &self,
            _config: &DataSourceConfig,
            _filters: &[AppliedFilter],
        ) -> ReportResult<Vec<Value>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(vec![json!({ "ok": true })])
            } else {
                Err(ReportError::Source("transient failure".into()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failures() {
        let manager = PipelineManager::new();
        manager.register_source(
            DataSourceType::Memory,
            Arc::new(FlakySource {
                calls: AtomicU32::new(0),
                succeed_on: 3,
            }),
        );
        let mut pipeline = memory_pipeline("flaky", vec![]);
        pipeline.cache.enabled = false;
        manager.register_pipeline(pipeline).expect("register");

        let result = manager
            .execute_pipeline_with_retry("flaky", &[], 3)
            .await
            .expect("third attempt succeeds");
        assert_eq!(result.total_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_surfaces_last_error_with_attempt_count() {
        let manager = PipelineManager::new();
        manager.register_source(
            DataSourceType::Memory,
            Arc::new(FlakySource {
                calls: AtomicU32::new(0),
                succeed_on: u32::MAX,
            }),
        );
        let mut pipeline = memory_pipeline("doomed", vec![]);
        pipeline.cache.enabled = false;
        manager.register_pipeline(pipeline).expect("register");

        let error = manager
            .execute_pipeline_with_retry("doomed", &[], 2)
            .await
            .expect_err("all attempts fail");
        match error {
            ReportError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("transient failure"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_attempt_does_not_poison_cache() {
        let manager = PipelineManager::new();
        manager.register_source(
            DataSourceType::Memory,
            Arc::new(FlakySource {
                calls: AtomicU32::new(0),
                succeed_on: 2,
            }),
        );
        manager
            .register_pipeline(memory_pipeline("poison", vec![]))
            .expect("register");

        let first = manager
            .execute_pipeline("poison", &[], PipelineExecutionOptions::default())
            .await;
        assert!(first.is_err());
        assert_eq!(manager.get_cache_stats().total_entries, 0);
    }
}
