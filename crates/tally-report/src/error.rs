//! Error types for report aggregation
//!
//! Target build failures are not errors here: they are recorded as data in
//! the report. The variants below cover the other three classes:
//! - Structural defects (duplicate or unexpected records, missing configurations, graph cycles)
//! - I/O failures while persisting the report
//! - Cancellation of the invocation

use std::path::PathBuf;
use tally_artifact::{LabelError, PathError};
use tally_graph::GraphError;

/// Main report error type
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// A (target, configuration) pair was recorded twice
    #[error("duplicate result for {target} ({configuration})")]
    DuplicateResult {
        target: String,
        configuration: String,
    },

    /// A result arrived for a pair that was never expected
    #[error("unexpected result for {target} ({configuration})")]
    UnexpectedResult {
        target: String,
        configuration: String,
    },

    /// A requested target finished with no configuration recorded
    #[error("no configuration recorded for requested target {0}")]
    MissingConfiguration(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("output path error: {0}")]
    Path(#[from] PathError),

    #[error("label error: {0}")]
    Label(#[from] LabelError),

    /// Invalid build plan
    #[error("build plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Build-wide failure raised by the execution engine
    #[error("build aborted: {0}")]
    BuildAborted(String),

    /// Cancelled before every obligation was recorded
    #[error("build cancelled")]
    Cancelled,

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ReportError {
    /// Whether the error points at an upstream defect rather than a user or
    /// environment problem
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResult { .. }
                | Self::UnexpectedResult { .. }
                | Self::MissingConfiguration(_)
                | Self::Path(_)
                | Self::Label(LabelError::UnknownCell(_))
                | Self::Graph(GraphError::CycleDetected { .. })
        )
    }

    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration and option errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Override not of the form `section.key=value`
    #[error("invalid config override `{0}`, expected section.key=value")]
    InvalidOverride(String),

    #[error("invalid boolean `{value}` for {key}")]
    InvalidBool { key: String, value: String },

    #[error("unknown build report option `{0}`")]
    UnknownReportOption(String),

    /// A config file value that is not a string, integer or boolean
    #[error("unsupported value for {0}")]
    UnsupportedValue(String),

    #[error("config file parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build plan errors
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("label error: {0}")]
    Label(#[from] LabelError),

    /// Target referenced but not declared
    #[error("target not in plan: {0}")]
    UnknownTarget(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}
