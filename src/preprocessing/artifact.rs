//! Persisted preprocessing state

use crate::error::{ArtifactLoadError, PipelineError, Result};
use crate::features::schema::{
    classify, CategoricalFeature, ColumnKind, ExcludedColumn, NumericFeature,
};
use crate::preprocessing::encoder::CategoryCodes;
use crate::preprocessing::scaler::ColumnStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const ARTIFACT_FORMAT: &str = "fraud-preprocessor";
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Everything `transform` needs, produced once by `fit_transform`.
///
/// Immutable after construction; share it across threads behind an `Arc`.
/// Every field is read-only from outside so the persisted name lists can
/// never disagree with the resolved state `transform` reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorArtifact {
    format: String,
    format_version: u32,
    created_at: DateTime<Utc>,
    numeric_features: Vec<String>,
    categorical_features: Vec<String>,
    features_to_drop: Vec<String>,
    encoders: BTreeMap<String, Vec<String>>,
    scaler: BTreeMap<String, ColumnStats>,

    #[serde(skip)]
    resolved: Resolved,
}

/// Typed view of the name lists, resolved once at construction or load.
#[derive(Debug, Clone, Default, PartialEq)]
struct Resolved {
    numeric: Vec<(NumericFeature, ColumnStats)>,
    categorical: Vec<(CategoricalFeature, CategoryCodes)>,
}

impl PreprocessorArtifact {
    pub(crate) fn new(
        numeric: Vec<(NumericFeature, ColumnStats)>,
        categorical: Vec<(CategoricalFeature, CategoryCodes)>,
        dropped: Vec<ExcludedColumn>,
    ) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            format_version: ARTIFACT_FORMAT_VERSION,
            created_at: Utc::now(),
            numeric_features: numeric.iter().map(|(f, _)| f.name().to_string()).collect(),
            categorical_features: categorical.iter().map(|(f, _)| f.name().to_string()).collect(),
            features_to_drop: dropped.iter().map(|c| c.name().to_string()).collect(),
            encoders: categorical
                .iter()
                .map(|(f, codes)| (f.name().to_string(), codes.classes().to_vec()))
                .collect(),
            scaler: numeric
                .iter()
                .map(|(f, stats)| (f.name().to_string(), *stats))
                .collect(),
            resolved: Resolved {
                numeric,
                categorical,
            },
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn numeric_features(&self) -> &[String] {
        &self.numeric_features
    }

    pub fn categorical_features(&self) -> &[String] {
        &self.categorical_features
    }

    /// Input columns that never reach the model.
    pub fn features_to_drop(&self) -> &[String] {
        &self.features_to_drop
    }

    /// Numeric columns in output order, with their fitted statistics.
    pub fn numeric(&self) -> &[(NumericFeature, ColumnStats)] {
        &self.resolved.numeric
    }

    /// Categorical columns in output order, with their fitted codes.
    pub fn categorical(&self) -> &[(CategoricalFeature, CategoryCodes)] {
        &self.resolved.categorical
    }

    /// Output column names: numeric columns, then categorical columns.
    pub fn feature_names(&self) -> Vec<String> {
        self.numeric_features
            .iter()
            .chain(self.categorical_features.iter())
            .cloned()
            .collect()
    }

    /// Whether the fitted batch carried labels.
    pub fn has_label(&self) -> bool {
        self.features_to_drop
            .iter()
            .any(|c| c == ExcludedColumn::Label.name())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::validation("artifact", e.to_string()))
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, ArtifactLoadError> {
        let mut artifact: PreprocessorArtifact = serde_json::from_str(json)?;
        artifact.resolve()?;
        Ok(artifact)
    }

    /// Write the artifact, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
        };
        write().map_err(|source| PipelineError::ArtifactSave {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            path = %path.display(),
            numeric = self.numeric_features.len(),
            categorical = self.categorical_features.len(),
            "Preprocessor artifact saved"
        );
        Ok(())
    }

    /// Load and validate an artifact. Any error here is fatal for a service.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact = Self::from_json(&json)?;

        info!(
            path = %path.display(),
            version = artifact.format_version,
            created_at = %artifact.created_at,
            "Preprocessor artifact loaded"
        );
        Ok(artifact)
    }

    /// Check format and version, then resolve every name against the compiled schema.
    fn resolve(&mut self) -> std::result::Result<(), ArtifactLoadError> {
        if self.format != ARTIFACT_FORMAT {
            return Err(ArtifactLoadError::FormatMismatch {
                found: self.format.clone(),
            });
        }
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactLoadError::VersionMismatch {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }

        let mut numeric = Vec::with_capacity(self.numeric_features.len());
        for name in &self.numeric_features {
            let feature = match lookup(name)? {
                ColumnKind::Numeric(f) => f,
                other => return Err(misplaced(name, other, "numeric")),
            };
            let stats = self.scaler.get(name).ok_or_else(|| {
                ArtifactLoadError::SchemaMismatch(format!("no scaler statistics for `{}`", name))
            })?;
            if !stats.mean.is_finite() {
                return Err(ArtifactLoadError::SchemaMismatch(format!(
                    "non-finite mean for `{}`",
                    name
                )));
            }
            numeric.push((feature, *stats));
        }
        if !numeric.iter().map(|(f, _)| *f).eq(NumericFeature::ALL) {
            return Err(ArtifactLoadError::SchemaMismatch(format!(
                "numeric columns {:?} do not match the {} compiled numeric columns",
                self.numeric_features,
                NumericFeature::ALL.len()
            )));
        }

        let mut categorical = Vec::with_capacity(self.categorical_features.len());
        for name in &self.categorical_features {
            let feature = match lookup(name)? {
                ColumnKind::Categorical(f) => f,
                other => return Err(misplaced(name, other, "categorical")),
            };
            let classes = self.encoders.get(name).ok_or_else(|| {
                ArtifactLoadError::SchemaMismatch(format!("no encoder for `{}`", name))
            })?;
            let codes = CategoryCodes::from_classes(classes.clone()).ok_or_else(|| {
                ArtifactLoadError::SchemaMismatch(format!(
                    "encoder classes for `{}` are not sorted and unique",
                    name
                ))
            })?;
            categorical.push((feature, codes));
        }
        if !categorical.iter().map(|(f, _)| *f).eq(CategoricalFeature::ALL) {
            return Err(ArtifactLoadError::SchemaMismatch(format!(
                "categorical columns {:?} do not match the {} compiled categorical columns",
                self.categorical_features,
                CategoricalFeature::ALL.len()
            )));
        }

        for name in &self.features_to_drop {
            match lookup(name)? {
                ColumnKind::Excluded(_) => {}
                other => return Err(misplaced(name, other, "dropped")),
            }
        }

        self.resolved = Resolved {
            numeric,
            categorical,
        };
        Ok(())
    }
}

fn lookup(name: &str) -> std::result::Result<ColumnKind, ArtifactLoadError> {
    classify(name)
        .ok_or_else(|| ArtifactLoadError::SchemaMismatch(format!("unknown column `{}`", name)))
}

fn misplaced(name: &str, kind: ColumnKind, listed_as: &str) -> ArtifactLoadError {
    ArtifactLoadError::SchemaMismatch(format!(
        "{} column `{}` listed as {}",
        kind.label(),
        name,
        listed_as
    ))
}
