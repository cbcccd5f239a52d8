//! Fraud Feature Pipeline - Batch Entry Point
//!
//! Fits the preprocessor on the training CSV, persists it together with the
//! processed baseline, then checks recent transactions for drift against
//! that baseline.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fraud_feature_pipeline::{
    config::{AppConfig, LoggingConfig},
    ingest,
    metrics::PipelineMetrics,
    monitoring::{spawn_periodic_flush, Distribution, FraudMonitor},
    preprocessing::{PreprocessingPipeline, PreprocessorArtifact},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fraud_feature_pipeline={}", logging.level)));
    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::load()?,
    };

    init_tracing(&config.logging);
    info!("Starting Fraud Feature Pipeline");

    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = PreprocessingPipeline::new();

    // Fit on training data
    let training = ingest::read_csv(&config.data.training_path).with_context(|| {
        format!(
            "Failed to read training data from {}",
            config.data.training_path.display()
        )
    })?;
    let started = Instant::now();
    let (fitted, artifact) = pipeline.fit_transform(&training)?;
    metrics.record_batch(started.elapsed(), &fitted);

    artifact.save(&config.artifact.path)?;
    fitted
        .matrix
        .write_csv(&config.data.baseline_path)
        .with_context(|| {
            format!(
                "Failed to write baseline to {}",
                config.data.baseline_path.display()
            )
        })?;
    info!(
        path = %config.data.baseline_path.display(),
        rows = fitted.matrix.n_rows(),
        "Processed baseline written"
    );

    // Reload exactly as a serving process would and confirm parity
    let artifact = Arc::new(
        PreprocessorArtifact::load(&config.artifact.path)
            .context("Preprocessor artifact failed to load")?,
    );
    let started = Instant::now();
    let served = pipeline.transform(&training, &artifact)?;
    metrics.record_batch(started.elapsed(), &served);
    match fitted.matrix.max_abs_diff(&served.matrix) {
        Some(diff) if diff == 0.0 => info!("Train/serve parity verified"),
        Some(diff) => bail!("Train/serve parity broken: max abs diff {}", diff),
        None => bail!("Train/serve parity broken: column layout differs"),
    }

    // Monitoring
    let monitor = Arc::new(FraudMonitor::from_baseline_csv(
        &config.data.baseline_path,
        &config.drift,
        &config.monitoring,
    )?);
    let flusher = spawn_periodic_flush(
        Arc::clone(&monitor),
        Duration::from_secs(config.monitoring.flush_interval_secs.max(1)),
    );

    match &config.data.current_path {
        Some(current_path) if current_path.exists() => {
            let recent = ingest::read_csv(current_path).with_context(|| {
                format!("Failed to read current data from {}", current_path.display())
            })?;
            let recent = ingest::stamp_missing(&recent, Utc::now());

            let started = Instant::now();
            let transformed = pipeline.transform(&recent, &artifact)?;
            metrics.record_batch(started.elapsed(), &transformed);
            if transformed.unseen_categories > 0 {
                warn!(
                    count = transformed.unseen_categories,
                    "Current data contains categories unseen during fit"
                );
            }

            let report = monitor.detect_data_drift(&Distribution::from_matrix(&transformed.matrix))?;
            metrics.record_drift(&report);
            for drift in &report.features_with_drift {
                warn!(
                    feature = %drift.feature,
                    statistic = drift.statistic,
                    p_value = drift.p_value,
                    "Feature drifted"
                );
            }
        }
        Some(current_path) => warn!(
            path = %current_path.display(),
            "Current data not found, skipping drift check"
        ),
        None => info!("No current data configured, skipping drift check"),
    }

    monitor.generate_report()?;
    flusher.abort();
    monitor.flush()?;

    info!("Pipeline finished");
    metrics.print_summary();

    Ok(())
}
