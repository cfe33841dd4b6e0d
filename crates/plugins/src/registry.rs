//! Plugin registry: dependency-checked registration, dependent-blocked
//! unregistration, and type-routed processor lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use traffboard_core::error::{ReportError, ReportResult};
use traffboard_core::types::ReportType;

use crate::export::ExportFormat;
use crate::plugin::{DataProcessor, ReportPlugin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_plugins: usize,
    pub data_processors: usize,
    pub export_formats: usize,
    pub plugins_by_type: BTreeMap<ReportType, usize>,
}

/// Process-wide plugin catalog. Construct one per application and inject
/// it; state lives for the registry's lifetime with no persistence.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<ReportPlugin>>,
    /// One processor per report type; the last registration for a type
    /// wins.
    data_processors: DashMap<ReportType, Arc<dyn DataProcessor>>,
    export_formats: DashMap<String, ExportFormat>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Fails, leaving the registry unchanged, when any
    /// declared dependency is not present.
    pub fn register(&self, plugin: ReportPlugin) -> ReportResult<()> {
        for dependency in &plugin.dependencies {
            if !self.plugins.contains_key(dependency) {
                return Err(ReportError::MissingDependency {
                    plugin: plugin.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let plugin = Arc::new(plugin);
        self.data_processors
            .insert(plugin.report_type, plugin.data_processor.clone());
        for format in &plugin.export_formats {
            self.export_formats.insert(format.id.clone(), format.clone());
        }

        debug!(plugin = %plugin.id, report_type = ?plugin.report_type, "Plugin registered");
        self.plugins.insert(plugin.id.clone(), plugin);
        Ok(())
    }

    /// Unregister a plugin. A missing id is a no-op; a plugin with live
    /// dependents fails, naming every dependent.
    pub fn unregister(&self, plugin_id: &str) -> ReportResult<()> {
        let Some(plugin) = self.plugins.get(plugin_id).map(|p| p.clone()) else {
            return Ok(());
        };

        let dependents: Vec<String> = self
            .plugins
            .iter()
            .filter(|entry| entry.value().dependencies.iter().any(|d| d == plugin_id))
            .map(|entry| entry.key().clone())
            .collect();

        if !dependents.is_empty() {
            return Err(ReportError::HasDependents {
                plugin: plugin_id.to_string(),
                dependents,
            });
        }

        self.plugins.remove(plugin_id);
        // The type association goes with the plugin even when other
        // plugins of the same type remain; callers re-register to restore.
        self.data_processors.remove(&plugin.report_type);
        for format in &plugin.export_formats {
            self.export_formats.remove(&format.id);
        }

        debug!(plugin = plugin_id, "Plugin unregistered");
        Ok(())
    }

    pub fn get_plugin(&self, plugin_id: &str) -> Option<Arc<ReportPlugin>> {
        self.plugins.get(plugin_id).map(|p| p.clone())
    }

    pub fn has_plugin(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn get_plugins_by_type(&self, report_type: ReportType) -> Vec<Arc<ReportPlugin>> {
        self.plugins
            .iter()
            .filter(|entry| entry.value().report_type == report_type)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_all_plugins(&self) -> Vec<Arc<ReportPlugin>> {
        self.plugins.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get_data_processor(&self, report_type: ReportType) -> Option<Arc<dyn DataProcessor>> {
        self.data_processors.get(&report_type).map(|p| p.clone())
    }

    pub fn get_export_format(&self, format_id: &str) -> Option<ExportFormat> {
        self.export_formats.get(format_id).map(|f| f.clone())
    }

    pub fn get_all_export_formats(&self) -> Vec<ExportFormat> {
        self.export_formats.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get_stats(&self) -> RegistryStats {
        let mut plugins_by_type: BTreeMap<ReportType, usize> = BTreeMap::new();
        for entry in self.plugins.iter() {
            *plugins_by_type.entry(entry.value().report_type).or_insert(0) += 1;
        }

        RegistryStats {
            total_plugins: self.plugins.len(),
            data_processors: self.data_processors.len(),
            export_formats: self.export_formats.len(),
            plugins_by_type,
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.len())
            .field("export_formats", &self.export_formats.len())
            .finish()
    }
}
