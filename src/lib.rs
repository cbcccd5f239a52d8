//! Fraud Feature Pipeline Library
//!
//! Deterministic feature derivation, categorical encoding and numeric scaling
//! for transaction fraud models, with a persisted preprocessor so training and
//! serving produce identical matrices, plus KS-based drift monitoring.

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod metrics;
pub mod monitoring;
pub mod preprocessing;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{ArtifactLoadError, DriftComputationError, PipelineError};
pub use features::FeatureDeriver;
pub use monitoring::{DriftDetector, FraudMonitor};
pub use preprocessing::{FeatureMatrix, PreprocessingPipeline, PreprocessorArtifact, Transformed};
pub use types::{Record, Transaction};
