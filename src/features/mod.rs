//! Feature schema and derivation

pub mod deriver;
pub mod schema;

pub use deriver::{DerivedFeatures, FeatureDeriver};
pub use schema::{CategoricalFeature, ColumnKind, ExcludedColumn, NumericFeature};
