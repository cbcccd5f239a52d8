//! Per-column distribution drift between a baseline and newly observed data

use crate::config::DriftConfig;
use crate::error::{DriftComputationError, Result};
use crate::monitoring::ks::{self, KsMethod};
use crate::preprocessing::matrix::FeatureMatrix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Samples of one named column. `NaN` marks a missing numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnSamples {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnSamples {
    pub fn len(&self) -> usize {
        match self {
            ColumnSamples::Numeric(v) => v.len(),
            ColumnSamples::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named columns of samples. Used for both the baseline and new data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    columns: BTreeMap<String, ColumnSamples>,
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, samples: ColumnSamples) -> Self {
        self.columns.insert(name.into(), samples);
        self
    }

    /// Capture every column of a processed feature matrix.
    pub fn from_matrix(matrix: &FeatureMatrix) -> Self {
        let columns = matrix
            .columns()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                (
                    name.clone(),
                    ColumnSamples::Numeric(matrix.values().column(j).to_vec()),
                )
            })
            .collect();
        Self { columns }
    }

    /// Load a CSV with a header row.
    ///
    /// A column whose non-blank cells all parse as numbers is numeric, with
    /// blank cells read as missing. Any other column is kept as text.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for result in reader.records() {
            let record = result?;
            for (column, cell) in raw.iter_mut().zip(record.iter()) {
                column.push(cell.trim().to_string());
            }
        }

        let columns: BTreeMap<String, ColumnSamples> = headers
            .iter()
            .zip(raw)
            .map(|(name, cells)| (name.to_string(), parse_column(cells)))
            .collect();

        info!(
            path = %path.display(),
            columns = columns.len(),
            rows = columns.values().next().map_or(0, ColumnSamples::len),
            "Loaded distribution"
        );
        Ok(Self { columns })
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSamples> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn parse_column(cells: Vec<String>) -> ColumnSamples {
    let parsed: Option<Vec<f64>> = cells
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                Some(f64::NAN)
            } else {
                cell.parse::<f64>().ok()
            }
        })
        .collect();
    match parsed {
        Some(values) => ColumnSamples::Numeric(values),
        None => ColumnSamples::Text(cells),
    }
}

/// Test outcome for one flagged column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub statistic: f64,
    pub p_value: f64,
    pub method: KsMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedColumn {
    pub feature: String,
    pub reason: String,
}

/// Result of one drift scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub p_value_threshold: f64,
    pub features_with_drift: Vec<FeatureDrift>,
    pub drift_detected: bool,
    pub columns_tested: usize,
    pub skipped: Vec<SkippedColumn>,
}

impl DriftReport {
    pub fn drifted_features(&self) -> impl Iterator<Item = &str> {
        self.features_with_drift.iter().map(|d| d.feature.as_str())
    }
}

/// Two-sample KS drift detector over a fixed baseline.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    baseline: Distribution,
    p_value_threshold: f64,
    min_samples: usize,
    exact_max_cells: usize,
}

impl DriftDetector {
    pub fn new(baseline: Distribution, config: &DriftConfig) -> Self {
        Self {
            baseline,
            p_value_threshold: config.p_value_threshold,
            min_samples: config.min_samples.max(1),
            exact_max_cells: config.exact_max_cells,
        }
    }

    pub fn baseline(&self) -> &Distribution {
        &self.baseline
    }

    /// Compare `current` against the baseline, column by column.
    ///
    /// Column failures never abort the scan; they are recorded in
    /// [`DriftReport::skipped`] and can only ever make drift go unreported.
    pub fn detect(&self, current: &Distribution) -> DriftReport {
        let mut features_with_drift = Vec::new();
        let mut skipped = Vec::new();
        let mut columns_tested = 0;

        for (feature, baseline) in &self.baseline.columns {
            let Some(samples) = current.get(feature) else {
                debug!(feature = %feature, "Column absent from current data");
                skipped.push(SkippedColumn {
                    feature: feature.clone(),
                    reason: "absent from current data".to_string(),
                });
                continue;
            };

            match self.test_column(feature, baseline, samples) {
                Ok(result) => {
                    columns_tested += 1;
                    debug!(
                        feature = %feature,
                        statistic = result.statistic,
                        p_value = result.p_value,
                        "KS test"
                    );
                    if result.p_value < self.p_value_threshold {
                        features_with_drift.push(result);
                    }
                }
                Err(e) => {
                    match &e {
                        DriftComputationError::InsufficientSamples { .. } => {
                            debug!(feature = %feature, reason = %e, "Skipping drift column")
                        }
                        _ => warn!(feature = %feature, error = %e, "Drift test failed for column"),
                    }
                    skipped.push(SkippedColumn {
                        feature: feature.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let drift_detected = !features_with_drift.is_empty();
        let report = DriftReport {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            p_value_threshold: self.p_value_threshold,
            features_with_drift,
            drift_detected,
            columns_tested,
            skipped,
        };

        if drift_detected {
            warn!(
                run_id = %report.run_id,
                drifted = report.features_with_drift.len(),
                tested = columns_tested,
                "Data drift detected"
            );
        } else {
            info!(
                run_id = %report.run_id,
                tested = columns_tested,
                skipped = report.skipped.len(),
                "No data drift detected"
            );
        }
        report
    }

    fn test_column(
        &self,
        feature: &str,
        baseline: &ColumnSamples,
        current: &ColumnSamples,
    ) -> std::result::Result<FeatureDrift, DriftComputationError> {
        let baseline = present_values(feature, baseline)?;
        let current = present_values(feature, current)?;

        if baseline.len() < self.min_samples || current.len() < self.min_samples {
            return Err(DriftComputationError::InsufficientSamples {
                feature: feature.to_string(),
                baseline: baseline.len(),
                current: current.len(),
                required: self.min_samples,
            });
        }

        let result = ks::two_sample(&baseline, &current, self.exact_max_cells).ok_or_else(|| {
            DriftComputationError::InsufficientSamples {
                feature: feature.to_string(),
                baseline: baseline.len(),
                current: current.len(),
                required: 1,
            }
        })?;

        Ok(FeatureDrift {
            feature: feature.to_string(),
            statistic: result.statistic,
            p_value: result.p_value,
            method: result.method,
        })
    }
}

/// Numeric values with missing entries removed.
fn present_values(
    feature: &str,
    samples: &ColumnSamples,
) -> std::result::Result<Vec<f64>, DriftComputationError> {
    let ColumnSamples::Numeric(values) = samples else {
        return Err(DriftComputationError::NonNumeric {
            feature: feature.to_string(),
        });
    };
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.iter().any(|v| v.is_infinite()) {
        return Err(DriftComputationError::NonFinite {
            feature: feature.to_string(),
        });
    }
    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(baseline: Distribution) -> DriftDetector {
        DriftDetector::new(baseline, &DriftConfig::default())
    }

    fn numeric(values: impl IntoIterator<Item = f64>) -> ColumnSamples {
        ColumnSamples::Numeric(values.into_iter().collect())
    }

    #[test]
    fn test_identical_distributions() {
        let values: Vec<f64> = (0..200).map(|i| (i as f64 * 0.37).sin()).collect();
        let baseline = Distribution::new().with_column("amount", numeric(values.clone()));
        let report = detector(baseline.clone()).detect(&baseline);

        assert!(!report.drift_detected);
        assert!(report.features_with_drift.is_empty());
        assert_eq!(report.columns_tested, 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_disjoint_distributions() {
        let baseline = Distribution::new()
            .with_column("x", numeric((0..=10).map(f64::from)))
            .with_column("y", numeric((0..=10).map(f64::from)));
        let current = Distribution::new()
            .with_column("x", numeric((1000..=1010).map(f64::from)))
            .with_column("y", numeric((0..=10).map(f64::from)));
        let report = detector(baseline).detect(&current);

        assert!(report.drift_detected);
        assert_eq!(report.drifted_features().collect::<Vec<_>>(), vec!["x"]);
        let x = &report.features_with_drift[0];
        assert_eq!(x.statistic, 1.0);
        assert!(x.p_value < 0.05);
        assert_eq!(report.columns_tested, 2);
    }

    #[test]
    fn test_one_sided_and_empty_columns_skipped() {
        let baseline = Distribution::new()
            .with_column("only_baseline", numeric([1.0, 2.0]))
            .with_column("all_missing", numeric([1.0, 2.0]))
            .with_column("ok", numeric([1.0, 2.0, 3.0]));
        let current = Distribution::new()
            .with_column("only_current", numeric([5.0]))
            .with_column("all_missing", numeric([f64::NAN, f64::NAN]))
            .with_column("ok", numeric([1.0, f64::NAN, 2.0, 3.0]));
        let report = detector(baseline).detect(&current);

        assert!(!report.drift_detected);
        assert_eq!(report.columns_tested, 1);
        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.feature.as_str()).collect();
        assert_eq!(skipped, vec!["all_missing", "only_baseline"]);
        assert!(report.skipped[0].reason.contains("too few samples"));
    }

    #[test]
    fn test_min_samples_threshold() {
        let baseline = Distribution::new().with_column("x", numeric((0..20).map(f64::from)));
        let current = Distribution::new().with_column("x", numeric([100.0, 200.0]));
        let config = DriftConfig {
            min_samples: 5,
            ..DriftConfig::default()
        };
        let report = DriftDetector::new(baseline, &config).detect(&current);
        assert!(!report.drift_detected);
        assert_eq!(report.columns_tested, 0);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_non_numeric_column_skipped_not_fatal() {
        let baseline = Distribution::new()
            .with_column("merchant", ColumnSamples::Text(vec!["gas".into()]))
            .with_column("x", numeric((0..=10).map(f64::from)));
        let current = Distribution::new()
            .with_column("merchant", ColumnSamples::Text(vec!["online".into()]))
            .with_column("x", numeric((500..=510).map(f64::from)));
        let report = detector(baseline).detect(&current);

        assert!(report.drift_detected);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].feature, "merchant");
        assert!(report.skipped[0].reason.contains("not numeric"));
    }

    #[test]
    fn test_infinite_values_skipped() {
        let baseline = Distribution::new().with_column("x", numeric([1.0, 2.0]));
        let current = Distribution::new().with_column("x", numeric([1.0, f64::INFINITY]));
        let report = detector(baseline).detect(&current);
        assert_eq!(report.columns_tested, 0);
        assert!(report.skipped[0].reason.contains("infinite"));
    }

    #[test]
    fn test_from_csv_and_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.csv");
        std::fs::write(&path, "a,b,c\n1.5,x,\n2.5,y,3\n").unwrap();

        let dist = Distribution::from_csv(&path).unwrap();
        assert_eq!(dist.len(), 3);
        assert_eq!(dist.get("a"), Some(&numeric([1.5, 2.5])));
        assert!(matches!(dist.get("b"), Some(ColumnSamples::Text(_))));
        match dist.get("c") {
            Some(ColumnSamples::Numeric(v)) => {
                assert!(v[0].is_nan());
                assert_eq!(v[1], 3.0);
            }
            other => panic!("unexpected column {:?}", other),
        }

        let matrix = FeatureMatrix::from_columns(
            vec![("a".to_string(), vec![1.5, 2.5]), ("z".to_string(), vec![0.0, 1.0])],
            2,
        )
        .unwrap();
        let from_matrix = Distribution::from_matrix(&matrix);
        assert_eq!(from_matrix.column_names().collect::<Vec<_>>(), vec!["a", "z"]);
        assert_eq!(from_matrix.get("a"), dist.get("a"));
    }

    #[test]
    fn test_report_serializes() {
        let baseline = Distribution::new().with_column("x", numeric([1.0, 2.0, 3.0]));
        let report = detector(baseline.clone()).detect(&baseline);
        let json = serde_json::to_string(&report).unwrap();
        let back: DriftReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
