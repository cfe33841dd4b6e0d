//! Report plugin system: registrable bundles of report type, config
//! schema, data processor, and export formats, with dependency-checked
//! lifecycle management.

pub mod export;
pub mod plugin;
pub mod registry;

pub use export::{default_export_formats, ExportFormat};
pub use plugin::{
    create_plugin_manifest, validate_plugin, DataProcessor, PassthroughProcessor, PluginManifest,
    ReportPlugin,
};
pub use registry::{PluginRegistry, RegistryStats};
