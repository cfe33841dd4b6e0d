//! Plugin definition, the data-processor seam, and plugin validation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use traffboard_core::error::ReportResult;
use traffboard_core::types::{
    AppliedFilter, BaseReportConfig, CacheStatus, FilterDefinition, ReportData, ReportMetadata,
    ReportType, DATA_VERSION,
};

use crate::export::{default_export_formats, ExportFormat};

/// Turns raw rows into report data for one report type.
#[async_trait]
pub trait DataProcessor: Send + Sync {
    async fn process(
        &self,
        raw_data: Vec<Value>,
        config: &BaseReportConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<ReportData<Value>>;
}

/// A self-describing, registrable report bundle.
#[derive(Clone)]
pub struct ReportPlugin {
    pub id: String,
    pub name: String,
    pub version: String,
    pub report_type: ReportType,
    /// Opaque rendering capability consumed by the UI layer.
    pub component: String,
    pub config_schema: Vec<FilterDefinition>,
    pub data_processor: Arc<dyn DataProcessor>,
    pub export_formats: Vec<ExportFormat>,
    /// Plugin IDs that must be registered before this one.
    pub dependencies: Vec<String>,
}

impl ReportPlugin {
    /// Minimal plugin with the default pass-through processor and the
    /// default export formats.
    pub fn new(id: &str, name: &str, version: &str, report_type: ReportType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            report_type,
            component: format!("{id}-report"),
            config_schema: Vec::new(),
            data_processor: Arc::new(PassthroughProcessor),
            export_formats: default_export_formats(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn DataProcessor>) -> Self {
        self.data_processor = processor;
        self
    }

    pub fn with_export_formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.export_formats = formats;
        self
    }
}

impl std::fmt::Debug for ReportPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPlugin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("report_type", &self.report_type)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Default processor: passes rows through untouched.
pub struct PassthroughProcessor;

#[async_trait]
impl DataProcessor for PassthroughProcessor {
    async fn process(
        &self,
        raw_data: Vec<Value>,
        config: &BaseReportConfig,
        filters: &[AppliedFilter],
    ) -> ReportResult<ReportData<Value>> {
        let total_count = raw_data.len();
        Ok(ReportData {
            rows: raw_data,
            total_count,
            metadata: ReportMetadata {
                execution_time_ms: 0,
                data_version: DATA_VERSION.to_string(),
                cache_status: CacheStatus::Miss,
                last_refresh: Utc::now(),
                query_hash: generate_query_hash(config, filters),
                filters: filters.iter().map(|f| f.value.clone()).collect(),
            },
        })
    }
}

/// Hex fingerprint of the report identity and its filters.
fn generate_query_hash(config: &BaseReportConfig, filters: &[AppliedFilter]) -> String {
    let mut pairs: Vec<&AppliedFilter> = filters.iter().collect();
    pairs.sort_by(|a, b| a.id.cmp(&b.id));

    let hash_input = serde_json::json!({
        "configId": config.id,
        "type": config.report_type,
        "filters": pairs,
    })
    .to_string();

    let mut hash: i32 = 0;
    for c in hash_input.chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as u32 as i32);
    }

    format!("{:x}", hash.unsigned_abs())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate a plugin definition, accumulating all violations. Presence of
/// the processor and format list is guaranteed by the types; the
/// string-identity checks remain.
pub fn validate_plugin(plugin: &ReportPlugin) -> PluginValidation {
    let mut errors = Vec::new();

    if plugin.id.is_empty() {
        errors.push("Plugin ID is required".to_string());
    }
    if plugin.name.is_empty() {
        errors.push("Plugin name is required".to_string());
    }
    if plugin.version.is_empty() {
        errors.push("Plugin version is required".to_string());
    }
    if plugin.component.is_empty() {
        errors.push("Plugin component is required".to_string());
    }

    PluginValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Descriptive manifest recorded alongside a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub author: String,
    pub homepage: String,
    pub repository: String,
}

pub fn create_plugin_manifest(
    id: &str,
    name: &str,
    version: &str,
    description: Option<&str>,
) -> PluginManifest {
    PluginManifest {
        id: id.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        description: description.map(str::to_string),
        registered_at: Utc::now(),
        author: "TraffBoard".to_string(),
        homepage: "https://traffboard.com".to_string(),
        repository: "https://github.com/traffboard/plugins".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_passthrough_processor_echoes_rows() {
        let config = BaseReportConfig {
            id: "r1".into(),
            title: "Conversions".into(),
            report_type: ReportType::Conversion,
        };
        let rows = vec![json!({ "clicks": 1 }), json!({ "clicks": 2 })];

        let report = PassthroughProcessor
            .process(rows.clone(), &config, &[])
            .await
            .expect("process");

        assert_eq!(report.rows, rows);
        assert_eq!(report.total_count, 2);
        assert!(!report.metadata.query_hash.is_empty());
    }

    #[test]
    fn test_validate_plugin_accumulates() {
        let mut plugin = ReportPlugin::new("", "", "", ReportType::Custom);
        plugin.component = String::new();
        let validation = validate_plugin(&plugin);
        assert!(!validation.valid);
        assert_eq!(validation.errors.len(), 4);
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest = create_plugin_manifest("p1", "Plugin", "1.0.0", Some("desc"));
        assert_eq!(manifest.author, "TraffBoard");
        assert_eq!(manifest.description.as_deref(), Some("desc"));
    }
}
