//! Error types for the feature pipeline and drift monitoring

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating, deriving, encoding or scaling records.
///
/// These always propagate to the immediate caller; the pipeline never
/// substitutes defaults for bad input.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("invalid value for field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("{0} used before fit")]
    NotFitted(&'static str),

    #[error(transparent)]
    ArtifactLoad(#[from] ArtifactLoadError),

    #[error("failed to write artifact to {path}: {source}")]
    ArtifactSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        PipelineError::MissingField(field.into())
    }
}

/// A persisted preprocessor could not be used. Fatal at service startup.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unexpected artifact format `{found}`")]
    FormatMismatch { found: String },

    #[error("artifact format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("artifact schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Column-scoped failure during a drift scan. The column is skipped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriftComputationError {
    #[error("column `{feature}` is not numeric")]
    NonNumeric { feature: String },

    #[error(
        "column `{feature}` has too few samples (baseline {baseline}, current {current}, need {required})"
    )]
    InsufficientSamples {
        feature: String,
        baseline: usize,
        current: usize,
        required: usize,
    },

    #[error("column `{feature}` contains infinite values")]
    NonFinite { feature: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
