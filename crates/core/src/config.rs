use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `TRAFFBOARD__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub cohort: CohortSettings,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_conversion_ttl_secs")]
    pub conversion_cache_ttl_secs: u64,
    #[serde(default = "default_cohort_ttl_secs")]
    pub cohort_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CohortSettings {
    /// Days of the requested range covered by one batch in pipelined mode.
    #[serde(default = "default_batch_size_days")]
    pub batch_size_days: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Ranges longer than this auto-enable pipelined mode.
    #[serde(default = "default_pipeline_threshold_days")]
    pub pipeline_threshold_days: i64,
    #[serde(default = "default_max_cohorts")]
    pub max_cohorts: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_conversion_ttl_secs() -> u64 {
    300
}

fn default_cohort_ttl_secs() -> u64 {
    1800
}

fn default_batch_size_days() -> u32 {
    50
}

fn default_max_concurrency() -> usize {
    4
}

fn default_pipeline_threshold_days() -> i64 {
    90
}

fn default_max_cohorts() -> usize {
    100
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_db() -> String {
    "traffboard".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            cohort: CohortSettings::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            conversion_cache_ttl_secs: default_conversion_ttl_secs(),
            cohort_cache_ttl_secs: default_cohort_ttl_secs(),
        }
    }
}

impl Default for CohortSettings {
    fn default() -> Self {
        Self {
            batch_size_days: default_batch_size_days(),
            max_concurrency: default_max_concurrency(),
            pipeline_threshold_days: default_pipeline_threshold_days(),
            max_cohorts: default_max_cohorts(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("TRAFFBOARD")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.conversion_cache_ttl_secs, 300);
        assert_eq!(config.pipeline.cohort_cache_ttl_secs, 1800);
        assert_eq!(config.cohort.pipeline_threshold_days, 90);
        assert_eq!(config.cohort.max_concurrency, 4);
    }
}
