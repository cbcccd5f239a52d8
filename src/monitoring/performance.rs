//! Classification metrics over labelled predictions

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One performance evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub timestamp: DateTime<Utc>,
    pub n_samples: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Share of actual frauds in the evaluated window
    pub fraud_rate: f64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

impl PerformanceMetrics {
    /// Compute metrics for 0/1 predictions against 0/1 actuals.
    ///
    /// Ratios with a zero denominator are 0, as is the fraud rate of an empty window.
    pub fn compute(predictions: &[u8], actuals: &[u8]) -> Result<Self> {
        if predictions.len() != actuals.len() {
            return Err(PipelineError::validation(
                "predictions",
                format!(
                    "{} predictions for {} actuals",
                    predictions.len(),
                    actuals.len()
                ),
            ));
        }

        let (mut tp, mut fp, mut fn_, mut tn) = (0u64, 0u64, 0u64, 0u64);
        for (&predicted, &actual) in predictions.iter().zip(actuals) {
            match (check_label("predictions", predicted)?, check_label("actuals", actual)?) {
                (1, 1) => tp += 1,
                (1, 0) => fp += 1,
                (0, 1) => fn_ += 1,
                _ => tn += 1,
            }
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            timestamp: Utc::now(),
            n_samples: predictions.len(),
            precision,
            recall,
            f1_score,
            fraud_rate: ratio(tp + fn_, predictions.len() as u64),
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: tn,
        })
    }
}

fn check_label(field: &str, value: u8) -> Result<u8> {
    match value {
        0 | 1 => Ok(value),
        other => Err(PipelineError::validation(
            field,
            format!("expected 0 or 1, got {}", other),
        )),
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute() {
        let predictions = [1, 1, 0, 0, 1, 0, 0, 0];
        let actuals = [1, 0, 1, 0, 1, 0, 0, 0];
        let m = PerformanceMetrics::compute(&predictions, &actuals).unwrap();

        assert_eq!(m.n_samples, 8);
        assert_eq!((m.true_positives, m.false_positives), (2, 1));
        assert_eq!((m.false_negatives, m.true_negatives), (1, 4));
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.fraud_rate, 3.0 / 8.0);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let m = PerformanceMetrics::compute(&[0, 0, 0], &[0, 0, 0]).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.fraud_rate, 0.0);

        let empty = PerformanceMetrics::compute(&[], &[]).unwrap();
        assert_eq!(empty.n_samples, 0);
        assert_eq!(empty.fraud_rate, 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            PerformanceMetrics::compute(&[1], &[1, 0]),
            Err(PipelineError::Validation { .. })
        ));
        assert!(matches!(
            PerformanceMetrics::compute(&[2], &[1]),
            Err(PipelineError::Validation { field, .. }) if field == "predictions"
        ));
    }
}
