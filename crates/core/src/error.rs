use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid pipeline: {}", .0.join(", "))]
    InvalidPipeline(Vec<String>),

    #[error("Pipeline \"{0}\" not found")]
    PipelineNotFound(String),

    #[error("Invalid plugin: {}", .0.join(", "))]
    InvalidPlugin(Vec<String>),

    #[error("Plugin \"{plugin}\" depends on \"{dependency}\" which is not registered")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Cannot unregister plugin \"{plugin}\" because it has dependents: {}", .dependents.join(", "))]
    HasDependents {
        plugin: String,
        dependents: Vec<String>,
    },

    #[error("{stage} failed: {message}")]
    Execution { stage: String, message: String },

    #[error("Pipeline execution failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ReportError {
    /// Wrap an underlying failure with the pipeline/cohort stage it occurred in.
    pub fn execution(stage: &str, err: impl std::fmt::Display) -> Self {
        Self::Execution {
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }
}
