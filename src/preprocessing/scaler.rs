//! Standardization of numeric columns

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Fitted mean and population standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    /// Fit on one column. An empty column yields mean 0, std 0.
    pub fn fit(values: &[f64]) -> Self {
        let Some(&first) = values.first() else {
            return Self { mean: 0.0, std: 0.0 };
        };
        // Constant columns keep their exact value as the mean so they scale to exactly 0.
        if values.iter().all(|&v| v == first) {
            return Self { mean: first, std: 0.0 };
        }

        let n = values.len() as f64;
        let sum = values.iter().sum::<f64>();
        let mean = if sum.is_finite() {
            sum / n
        } else {
            running_mean(values)
        };
        let squares = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        let std = if squares.is_finite() {
            (squares / n).sqrt()
        } else {
            rescaled_std(values, mean)
        };
        Self { mean, std }
    }

    /// Divisor used at apply time. Zero or non-finite deviations divide by 1.0.
    pub fn divisor(&self) -> f64 {
        if self.std > 0.0 && self.std.is_finite() {
            self.std
        } else {
            1.0
        }
    }

    pub fn scale(&self, value: f64) -> f64 {
        (value - self.mean) / self.divisor()
    }
}

/// Incremental mean; stays finite for any finite input.
fn running_mean(values: &[f64]) -> f64 {
    let mut mean = 0.0;
    for (k, &x) in values.iter().enumerate() {
        let k = (k + 1) as f64;
        mean += x / k - mean / k;
    }
    mean
}

/// Population std with deviations divided by the largest one before squaring.
fn rescaled_std(values: &[f64], mean: f64) -> f64 {
    let largest = values.iter().fold(0.0_f64, |m, x| m.max((x - mean).abs()));
    if largest == 0.0 || !largest.is_finite() {
        return largest;
    }
    let squares = values
        .iter()
        .map(|x| ((x - mean) / largest).powi(2))
        .sum::<f64>();
    largest * (squares / values.len() as f64).sqrt()
}

/// Numeric scaler over a fixed set of columns.
#[derive(Debug, Clone, Default)]
pub struct NumericScaler {
    stats: Option<Vec<ColumnStats>>,
}

impl NumericScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(stats: Vec<ColumnStats>) -> Self {
        Self { stats: Some(stats) }
    }

    /// Fit per-column statistics, replacing any earlier fit.
    pub fn fit<C: AsRef<[f64]>>(&mut self, columns: &[C]) -> &[ColumnStats] {
        let stats = columns.iter().map(|c| ColumnStats::fit(c.as_ref())).collect();
        self.stats.insert(stats)
    }

    /// Standardize columns with the fitted statistics.
    pub fn apply<C: AsRef<[f64]>>(&self, columns: &[C]) -> Result<Vec<Vec<f64>>> {
        let stats = self
            .stats
            .as_ref()
            .ok_or(PipelineError::NotFitted("NumericScaler"))?;
        if columns.len() != stats.len() {
            return Err(PipelineError::validation(
                "numeric columns",
                format!("scaler fitted on {} columns, got {}", stats.len(), columns.len()),
            ));
        }
        Ok(columns
            .iter()
            .zip(stats)
            .map(|(column, s)| column.as_ref().iter().map(|&v| s.scale(v)).collect())
            .collect())
    }

    pub fn state(&self) -> Option<&[ColumnStats]> {
        self.stats.as_deref()
    }

    pub fn into_state(self) -> Option<Vec<ColumnStats>> {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardizes_to_zero_mean_unit_variance() {
        let mut scaler = NumericScaler::new();
        let column = vec![1.0, 2.0, 3.0, 4.0];
        scaler.fit(&[column.clone()]);

        let scaled = scaler.apply(&[column]).unwrap().remove(0);
        let mean: f64 = scaled.iter().sum::<f64>() / 4.0;
        let var: f64 = scaled.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_population_std() {
        let stats = ColumnStats::fit(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std, 2.0);
    }

    #[test]
    fn test_zero_variance_column() {
        let mut scaler = NumericScaler::new();
        scaler.fit(&[vec![5.0, 5.0, 5.0]]);
        let scaled = scaler.apply(&[vec![5.0, 6.0]]).unwrap();
        assert_eq!(scaled[0], vec![0.0, 1.0]);
        assert!(scaled[0].iter().all(|v| v.is_finite()));

        let stats = ColumnStats::fit(&[0.1, 0.1, 0.1]);
        assert_eq!(stats.scale(0.1), 0.0);
    }

    #[test]
    fn test_apply_before_fit_fails() {
        let scaler = NumericScaler::new();
        assert!(matches!(
            scaler.apply(&[vec![1.0]]),
            Err(PipelineError::NotFitted("NumericScaler"))
        ));
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut scaler = NumericScaler::new();
        scaler.fit(&[vec![1.0, 2.0]]);
        assert!(matches!(
            scaler.apply(&[vec![1.0], vec![2.0]]),
            Err(PipelineError::Validation { .. })
        ));
    }

    #[test]
    fn test_extreme_magnitudes_keep_finite_stats() {
        let stats = ColumnStats::fit(&[1e308, 1e308, -1e308]);
        assert!(stats.mean.is_finite());
        assert!(stats.std.is_finite());
        assert!(stats.mean > 0.0);
        assert!(stats.std > 1e307);

        let stats = ColumnStats::fit(&[1e304, 0.0, 0.0, 0.0]);
        assert_eq!(stats.mean, 2.5e303);
        assert!(stats.std.is_finite());
    }

    #[test]
    fn test_non_finite_std_uses_unit_divisor() {
        let stats = ColumnStats {
            mean: 1.0,
            std: f64::NAN,
        };
        assert_eq!(stats.divisor(), 1.0);
        assert_eq!(stats.scale(3.0), 2.0);
    }
}
