//! Encoding, scaling and persisted preprocessing state

pub mod artifact;
pub mod encoder;
pub mod matrix;
pub mod pipeline;
pub mod scaler;

pub use artifact::PreprocessorArtifact;
pub use encoder::{CategoricalEncoder, CategoryCodes, UNSEEN_CATEGORY};
pub use matrix::FeatureMatrix;
pub use pipeline::{PreprocessingPipeline, Transformed};
pub use scaler::{ColumnStats, NumericScaler};
