//! Export format descriptors and the default set every plugin can offer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportFormat {
    pub id: String,
    pub name: String,
    pub extension: String,
    pub mime_type: String,
    /// Capabilities the format supports, e.g. "charts", "formatting".
    #[serde(default)]
    pub supports: Vec<String>,
}

pub fn csv() -> ExportFormat {
    ExportFormat {
        id: "csv".into(),
        name: "CSV".into(),
        extension: "csv".into(),
        mime_type: "text/csv".into(),
        supports: Vec::new(),
    }
}

pub fn json() -> ExportFormat {
    ExportFormat {
        id: "json".into(),
        name: "JSON".into(),
        extension: "json".into(),
        mime_type: "application/json".into(),
        supports: vec!["metadata".into()],
    }
}

pub fn excel() -> ExportFormat {
    ExportFormat {
        id: "excel".into(),
        name: "Excel".into(),
        extension: "xlsx".into(),
        mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".into(),
        supports: vec!["formatting".into()],
    }
}

pub fn pdf() -> ExportFormat {
    ExportFormat {
        id: "pdf".into(),
        name: "PDF".into(),
        extension: "pdf".into(),
        mime_type: "application/pdf".into(),
        supports: vec!["images".into(), "charts".into(), "formatting".into()],
    }
}

pub fn png() -> ExportFormat {
    ExportFormat {
        id: "png".into(),
        name: "PNG Image".into(),
        extension: "png".into(),
        mime_type: "image/png".into(),
        supports: vec!["images".into(), "charts".into()],
    }
}

/// The formats a plugin gets when it does not declare its own.
pub fn default_export_formats() -> Vec<ExportFormat> {
    vec![csv(), json()]
}
