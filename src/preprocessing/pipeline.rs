//! Fit / transform orchestration.
//!
//! Stages run in a fixed order: derive features, partition columns by the
//! declared schema, encode categoricals, scale numerics. `fit_transform`
//! estimates the encoder and scaler state, freezes it into a
//! [`PreprocessorArtifact`], and then runs the very same transform path that
//! `transform` uses, so training and serving output cannot diverge.

use crate::error::{PipelineError, Result};
use crate::features::deriver::{DerivedFeatures, FeatureDeriver};
use crate::features::schema::{CategoricalFeature, ExcludedColumn, NumericFeature};
use crate::preprocessing::artifact::PreprocessorArtifact;
use crate::preprocessing::encoder::{CategoricalEncoder, UNSEEN_CATEGORY};
use crate::preprocessing::matrix::FeatureMatrix;
use crate::preprocessing::scaler::NumericScaler;
use crate::types::transaction::Transaction;
use tracing::{debug, info};

/// Output of a fit or transform pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub matrix: FeatureMatrix,
    /// Present only when every record in the batch is labelled.
    pub labels: Option<Vec<u8>>,
    /// Number of categorical values that mapped to the unseen sentinel.
    pub unseen_categories: usize,
}

/// The preprocessing pipeline. Holds no fitted state.
#[derive(Debug, Clone, Default)]
pub struct PreprocessingPipeline {
    deriver: FeatureDeriver,
}

impl PreprocessingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit encoders and scaler on a training batch and transform it.
    pub fn fit_transform(
        &self,
        batch: &[Transaction],
    ) -> Result<(Transformed, PreprocessorArtifact)> {
        if batch.is_empty() {
            return Err(PipelineError::validation("batch", "cannot fit on an empty batch"));
        }
        info!(rows = batch.len(), "Fitting preprocessing pipeline");

        let labels = collect_labels(batch)?;
        let derived = self.deriver.derive_batch(batch)?;

        let numeric_columns = NumericFeature::ALL
            .iter()
            .map(|&f| numeric_column(&derived, f))
            .collect::<Result<Vec<_>>>()?;
        let mut scaler = NumericScaler::new();
        let numeric = NumericFeature::ALL
            .into_iter()
            .zip(scaler.fit(&numeric_columns).iter().copied())
            .map(|(f, stats)| {
                if stats.mean.is_finite() && stats.std.is_finite() {
                    Ok((f, stats))
                } else {
                    Err(PipelineError::validation(
                        f.name(),
                        format!(
                            "fitted statistics are not finite (mean {}, std {})",
                            stats.mean, stats.std
                        ),
                    ))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let categorical = CategoricalFeature::ALL
            .into_iter()
            .map(|f| {
                let mut encoder = CategoricalEncoder::new();
                let codes = encoder.fit(&categorical_column(&derived, f)).clone();
                debug!(feature = %f, classes = codes.len(), "Fitted categorical encoder");
                (f, codes)
            })
            .collect();

        let mut dropped = vec![ExcludedColumn::TransactionId, ExcludedColumn::Timestamp];
        if labels.is_some() {
            dropped.push(ExcludedColumn::Label);
        }

        let artifact = PreprocessorArtifact::new(numeric, categorical, dropped);
        let transformed = transform_derived(&derived, labels, &artifact)?;

        if let Some(labels) = &transformed.labels {
            let fraud_rate =
                labels.iter().map(|&l| f64::from(l)).sum::<f64>() / labels.len() as f64;
            info!(fraud_rate = %format!("{:.2}%", fraud_rate * 100.0), "Target vector ready");
        }
        info!(
            rows = transformed.matrix.n_rows(),
            columns = transformed.matrix.n_cols(),
            numeric = artifact.numeric().len(),
            categorical = artifact.categorical().len(),
            "Preprocessing pipeline fitted"
        );
        Ok((transformed, artifact))
    }

    /// Transform a batch with previously fitted state. Never re-estimates anything.
    pub fn transform(
        &self,
        batch: &[Transaction],
        artifact: &PreprocessorArtifact,
    ) -> Result<Transformed> {
        let labels = collect_labels(batch)?;
        let derived = self.deriver.derive_batch(batch)?;
        transform_derived(&derived, labels, artifact)
    }
}

/// One derived numeric column. Overflowed values are rejected, never scaled.
fn numeric_column(derived: &[DerivedFeatures], feature: NumericFeature) -> Result<Vec<f64>> {
    derived
        .iter()
        .enumerate()
        .map(|(row, d)| match d.numeric(feature) {
            v if v.is_finite() => Ok(v),
            v => Err(PipelineError::validation(
                feature.name(),
                format!("row {} derives to non-finite value {}", row, v),
            )),
        })
        .collect()
}

fn categorical_column(derived: &[DerivedFeatures], feature: CategoricalFeature) -> Vec<&str> {
    derived.iter().map(|d| d.categorical(feature)).collect()
}

fn collect_labels(batch: &[Transaction]) -> Result<Option<Vec<u8>>> {
    let labelled = batch.iter().filter(|tx| tx.is_fraud.is_some()).count();
    if labelled == 0 {
        return Ok(None);
    }
    if labelled != batch.len() {
        return Err(PipelineError::validation(
            ExcludedColumn::Label.name(),
            format!("only {} of {} records are labelled", labelled, batch.len()),
        ));
    }
    Ok(batch.iter().map(|tx| tx.is_fraud).collect())
}

/// Shared apply path for fit and transform.
fn transform_derived(
    derived: &[DerivedFeatures],
    labels: Option<Vec<u8>>,
    artifact: &PreprocessorArtifact,
) -> Result<Transformed> {
    let rows = derived.len();
    let mut columns = Vec::with_capacity(artifact.numeric().len() + artifact.categorical().len());

    let raw = artifact
        .numeric()
        .iter()
        .map(|&(f, _)| numeric_column(derived, f))
        .collect::<Result<Vec<_>>>()?;
    let scaler = NumericScaler::from_state(artifact.numeric().iter().map(|&(_, s)| s).collect());
    for (&(feature, _), scaled) in artifact.numeric().iter().zip(scaler.apply(&raw)?) {
        columns.push((feature.name().to_string(), scaled));
    }

    let mut unseen_categories = 0;
    for (feature, codes) in artifact.categorical() {
        let encoded = codes.encode(&categorical_column(derived, *feature));
        let unseen = encoded.iter().filter(|&&c| c == UNSEEN_CATEGORY).count();
        if unseen > 0 {
            debug!(feature = %feature, count = unseen, "Unseen categories mapped to sentinel");
        }
        unseen_categories += unseen;
        columns.push((
            feature.name().to_string(),
            encoded.into_iter().map(|c| c as f64).collect(),
        ));
    }

    let matrix = FeatureMatrix::from_columns(columns, rows)?;
    Ok(Transformed {
        matrix,
        labels,
        unseen_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{batch, transaction};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn test_train_serve_parity() {
        let pipeline = PreprocessingPipeline::new();
        let training = batch(200);
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();
        let served = pipeline.transform(&training, &artifact).unwrap();

        assert_eq!(fitted.matrix.max_abs_diff(&served.matrix), Some(0.0));
        assert_eq!(fitted.labels, served.labels);
        assert_eq!(fitted.unseen_categories, 0);
    }

    #[test]
    fn test_parity_survives_persistence() {
        let pipeline = PreprocessingPipeline::new();
        let training = batch(150);
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessor.json");
        artifact.save(&path).unwrap();
        let loaded = PreprocessorArtifact::load(&path).unwrap();

        let served = pipeline.transform(&training, &loaded).unwrap();
        assert_eq!(fitted.matrix, served.matrix);
    }

    #[test]
    fn test_single_record_matches_batch_row() {
        let pipeline = PreprocessingPipeline::new();
        let training = batch(100);
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();

        for i in [0, 17, 99] {
            let single = pipeline.transform(&training[i..=i], &artifact).unwrap();
            assert_eq!(single.matrix.row(0), fitted.matrix.row(i));
        }
    }

    #[test]
    fn test_column_layout() {
        let pipeline = PreprocessingPipeline::new();
        let (fitted, artifact) = pipeline.fit_transform(&batch(50)).unwrap();

        assert_eq!(fitted.matrix.columns(), artifact.feature_names().as_slice());
        assert_eq!(fitted.matrix.n_cols(), 28);
        assert_eq!(fitted.matrix.columns()[0], "amount");
        assert_eq!(fitted.matrix.columns()[22], "merchant_category");
        assert_eq!(
            artifact.features_to_drop(),
            ["transaction_id", "timestamp", "is_fraud"]
        );
        for dropped in ["transaction_id", "timestamp", "is_fraud"] {
            assert!(fitted.matrix.column(dropped).is_none());
        }
    }

    #[test]
    fn test_scaled_numeric_columns() {
        let pipeline = PreprocessingPipeline::new();
        let (fitted, _) = pipeline.fit_transform(&batch(120)).unwrap();
        let amount = fitted.matrix.column("amount").unwrap();
        let mean = amount.sum() / amount.len() as f64;
        assert!(mean.abs() < 1e-9);
        assert!(fitted.matrix.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_categoricals_are_codes_not_scaled() {
        let pipeline = PreprocessingPipeline::new();
        let (fitted, artifact) = pipeline.fit_transform(&batch(30)).unwrap();
        let merchants = fitted.matrix.column("merchant_category").unwrap();
        // grocery, online, gas, restaurant, travel -> sorted codes
        assert_eq!(merchants[0], 1.0);
        assert_eq!(merchants[1], 2.0);
        assert_eq!(merchants[2], 0.0);
        let (_, codes) = &artifact.categorical()[0];
        assert_eq!(codes.classes(), ["gas", "grocery", "online", "restaurant", "travel"]);
    }

    #[test]
    fn test_unseen_category_at_transform() {
        let pipeline = PreprocessingPipeline::new();
        let (_, artifact) = pipeline.fit_transform(&batch(40)).unwrap();

        let mut live = transaction(3);
        live.merchant_category = "crypto_exchange".to_string();
        let out = pipeline.transform(&[live], &artifact).unwrap();
        assert_eq!(out.matrix.column("merchant_category").unwrap()[0], -1.0);
        assert_eq!(out.unseen_categories, 1);
    }

    #[test]
    fn test_zero_variance_column_scales_to_zero() {
        let pipeline = PreprocessingPipeline::new();
        let training: Vec<Transaction> = batch(25)
            .into_iter()
            .map(|mut tx| {
                tx.customer_age = 5;
                tx
            })
            .collect();
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();
        assert!(fitted
            .matrix
            .column("customer_age")
            .unwrap()
            .iter()
            .all(|&v| v == 0.0));

        let served = pipeline.transform(&training[..1], &artifact).unwrap();
        assert_eq!(served.matrix.column("customer_age").unwrap()[0], 0.0);
    }

    #[test]
    fn test_risk_score_column_uses_canonical_formula() {
        let pipeline = PreprocessingPipeline::new();
        let (_, artifact) = pipeline.fit_transform(&batch(60)).unwrap();

        let scenario = Transaction {
            transaction_id: None,
            amount: 1500.0,
            merchant_category: "online".to_string(),
            card_present: 0,
            transaction_type: "purchase".to_string(),
            distance_from_home: 150.0,
            distance_from_last_transaction: 5.0,
            time_since_last_transaction: 30.0,
            customer_age: 40,
            customer_tenure_days: 400,
            avg_transaction_amount_30d: 200.0,
            num_transactions_24h: 8,
            num_transactions_7d: 25,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 2, 3, 0, 0).unwrap()),
            is_fraud: None,
        };
        let out = pipeline.transform(&[scenario], &artifact).unwrap();
        let (_, stats) = artifact
            .numeric()
            .iter()
            .find(|(f, _)| *f == NumericFeature::RiskScore)
            .unwrap();
        let scaled = out.matrix.column("risk_score").unwrap()[0];
        assert_eq!(scaled, stats.scale(5.0));
        assert_eq!(out.labels, None);
    }

    #[test]
    fn test_overflowing_ratio_is_rejected() {
        let pipeline = PreprocessingPipeline::new();
        let mut training = batch(10);
        training[0].amount = 1e304;
        training[0].avg_transaction_amount_30d = 0.0;
        assert!(matches!(
            pipeline.fit_transform(&training),
            Err(PipelineError::Validation { field, .. }) if field == "amount_to_avg_ratio"
        ));

        let (_, artifact) = pipeline.fit_transform(&batch(10)).unwrap();
        assert!(matches!(
            pipeline.transform(&training[..1], &artifact),
            Err(PipelineError::Validation { field, .. }) if field == "amount_to_avg_ratio"
        ));
    }

    #[test]
    fn test_huge_finite_amounts_round_trip() {
        let pipeline = PreprocessingPipeline::new();
        let mut training = batch(10);
        training[0].amount = 1e304;
        training[0].avg_transaction_amount_30d = 1e300;
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();
        assert!(fitted.matrix.values().iter().all(|v| v.is_finite()));

        let loaded = PreprocessorArtifact::from_json(&artifact.to_json().unwrap()).unwrap();
        let served = pipeline.transform(&training, &loaded).unwrap();
        assert_eq!(fitted.matrix, served.matrix);
    }

    #[test]
    fn test_raw_json_without_timestamp_end_to_end() {
        let pipeline = PreprocessingPipeline::new();
        let (_, artifact) = pipeline.fit_transform(&batch(60)).unwrap();

        let payload = r#"{
            "transaction_id": "tx_001",
            "amount": 1500.0,
            "merchant_category": "online",
            "card_present": 0,
            "transaction_type": "purchase",
            "distance_from_home": 150.0,
            "distance_from_last_transaction": 5.0,
            "time_since_last_transaction": 30.0,
            "customer_age": 40,
            "customer_tenure_days": 400,
            "avg_transaction_amount_30d": 200.0,
            "num_transactions_24h": 8,
            "num_transactions_7d": 25
        }"#;
        let parsed = crate::ingest::parse_json(payload).unwrap();
        assert_eq!(parsed[0].timestamp, None);
        assert!(pipeline.transform(&parsed, &artifact).is_err());

        let now = Utc.with_ymd_and_hms(2024, 3, 2, 14, 30, 0).unwrap();
        let stamped = crate::ingest::stamp_missing(&parsed, now);
        let out = pipeline.transform(&stamped, &artifact).unwrap();

        let (_, risk) = artifact
            .numeric()
            .iter()
            .find(|(f, _)| *f == NumericFeature::RiskScore)
            .unwrap();
        assert_eq!(out.matrix.column("risk_score").unwrap()[0], risk.scale(5.0));

        let (_, amount_codes) = artifact
            .categorical()
            .iter()
            .find(|(f, _)| *f == CategoricalFeature::AmountCategory)
            .unwrap();
        let code = out.matrix.column("amount_category").unwrap()[0];
        assert_eq!(code, amount_codes.code("high") as f64);
        assert_ne!(code, -1.0);
        assert_eq!(out.labels, None);
    }

    #[test]
    fn test_empty_batches() {
        let pipeline = PreprocessingPipeline::new();
        assert!(matches!(
            pipeline.fit_transform(&[]),
            Err(PipelineError::Validation { .. })
        ));

        let (_, artifact) = pipeline.fit_transform(&batch(10)).unwrap();
        let out = pipeline.transform(&[], &artifact).unwrap();
        assert_eq!(out.matrix.n_rows(), 0);
        assert_eq!(out.matrix.n_cols(), 28);
    }

    #[test]
    fn test_partial_labels_rejected() {
        let pipeline = PreprocessingPipeline::new();
        let mut training = batch(10);
        training[4].is_fraud = None;
        assert!(matches!(
            pipeline.fit_transform(&training),
            Err(PipelineError::Validation { field, .. }) if field == "is_fraud"
        ));
    }

    #[test]
    fn test_unlabelled_fit_keeps_label_out_of_drop_list() {
        let pipeline = PreprocessingPipeline::new();
        let training: Vec<Transaction> = batch(10)
            .into_iter()
            .map(|mut tx| {
                tx.is_fraud = None;
                tx
            })
            .collect();
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();
        assert!(fitted.labels.is_none());
        assert!(!artifact.has_label());
    }

    #[test]
    fn test_missing_timestamp_propagates() {
        let pipeline = PreprocessingPipeline::new();
        let (_, artifact) = pipeline.fit_transform(&batch(10)).unwrap();
        let mut live = transaction(1);
        live.timestamp = None;
        assert!(matches!(
            pipeline.transform(&[live], &artifact),
            Err(PipelineError::MissingField(f)) if f == "timestamp"
        ));
    }

    #[test]
    fn test_concurrent_transforms_share_artifact() {
        let pipeline = PreprocessingPipeline::new();
        let training = batch(300);
        let (fitted, artifact) = pipeline.fit_transform(&training).unwrap();
        let artifact = Arc::new(artifact);

        std::thread::scope(|scope| {
            let handles: Vec<_> = training
                .chunks(50)
                .enumerate()
                .map(|(chunk_idx, chunk)| {
                    let artifact = Arc::clone(&artifact);
                    let pipeline = pipeline.clone();
                    scope.spawn(move || {
                        (chunk_idx, pipeline.transform(chunk, &artifact).unwrap())
                    })
                })
                .collect();

            for handle in handles {
                let (chunk_idx, out) = handle.join().unwrap();
                for row in 0..out.matrix.n_rows() {
                    assert_eq!(out.matrix.row(row), fitted.matrix.row(chunk_idx * 50 + row));
                }
            }
        });
    }
}
