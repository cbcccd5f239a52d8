//! Production monitor: prediction, performance, drift and alert logs

use crate::config::{DriftConfig, MonitoringConfig};
use crate::monitoring::drift::{DriftDetector, DriftReport, Distribution};
use crate::monitoring::performance::PerformanceMetrics;
use crate::monitoring::store::JsonlStore;
use crate::types::alert::{AlertThresholds, MonitoringAlert};
use crate::types::transaction::Record;
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const PREDICTIONS_FILE: &str = "predictions.jsonl";
const PERFORMANCE_FILE: &str = "performance.jsonl";
const DRIFT_FILE: &str = "drift.jsonl";
const ALERTS_FILE: &str = "alerts.jsonl";
const REPORT_FILE: &str = "monitoring_report.json";

const REPORT_PERFORMANCE_WINDOW: usize = 10;
const REPORT_DRIFT_WINDOW: usize = 5;

/// One scored transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub features: Record,
    pub prediction: u8,
    pub probability: f64,
    pub actual: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub avg_precision: f64,
    pub avg_recall: f64,
    pub drift_detected_count: u64,
    pub alerts_raised: u64,
}

/// Point-in-time snapshot written to `monitoring_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub generated_at: DateTime<Utc>,
    pub total_predictions: u64,
    pub performance_metrics: Vec<PerformanceMetrics>,
    pub drift_detections: Vec<DriftReport>,
    pub summary: ReportSummary,
}

#[derive(Debug, Default)]
struct MonitorState {
    pending_predictions: Vec<PredictionRecord>,
    total_predictions: u64,
    recent_performance: VecDeque<PerformanceMetrics>,
    performance_runs: u64,
    precision_sum: f64,
    recall_sum: f64,
    recent_drift: VecDeque<DriftReport>,
    drift_detected_count: u64,
    alerts_raised: u64,
}

/// Monitoring front end for a deployed fraud model.
///
/// Every log is an append-only JSON Lines file under the configured
/// directory. All appends happen while holding the state lock, so concurrent
/// callers never interleave partial lines.
pub struct FraudMonitor {
    detector: DriftDetector,
    thresholds: AlertThresholds,
    flush_every: usize,
    log_dir: PathBuf,
    predictions: JsonlStore,
    performance: JsonlStore,
    drift: JsonlStore,
    alerts: JsonlStore,
    state: Mutex<MonitorState>,
}

impl FraudMonitor {
    pub fn new(
        baseline: Distribution,
        drift: &DriftConfig,
        monitoring: &MonitoringConfig,
    ) -> Result<Self> {
        let log_dir = monitoring.log_dir.clone();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        info!(
            log_dir = %log_dir.display(),
            baseline_columns = baseline.len(),
            "Fraud monitor initialized"
        );

        Ok(Self {
            detector: DriftDetector::new(baseline, drift),
            thresholds: AlertThresholds {
                min_precision: monitoring.min_precision,
                min_recall: monitoring.min_recall,
            },
            flush_every: monitoring.flush_every.max(1),
            predictions: JsonlStore::new(log_dir.join(PREDICTIONS_FILE)),
            performance: JsonlStore::new(log_dir.join(PERFORMANCE_FILE)),
            drift: JsonlStore::new(log_dir.join(DRIFT_FILE)),
            alerts: JsonlStore::new(log_dir.join(ALERTS_FILE)),
            log_dir,
            state: Mutex::new(MonitorState::default()),
        })
    }

    /// Load the baseline from a processed-feature CSV.
    pub fn from_baseline_csv<P: AsRef<Path>>(
        baseline_path: P,
        drift: &DriftConfig,
        monitoring: &MonitoringConfig,
    ) -> Result<Self> {
        let baseline_path = baseline_path.as_ref();
        let baseline = Distribution::from_csv(baseline_path).with_context(|| {
            format!("Failed to load baseline from {}", baseline_path.display())
        })?;
        Self::new(baseline, drift, monitoring)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer a prediction; the buffer is written every `flush_every` entries.
    pub fn log_prediction(
        &self,
        features: Record,
        prediction: u8,
        probability: f64,
        actual: Option<u8>,
    ) -> Result<()> {
        ensure!(prediction <= 1, "prediction must be 0 or 1, got {}", prediction);
        ensure!(
            (0.0..=1.0).contains(&probability),
            "probability must be within [0, 1], got {}",
            probability
        );
        if let Some(actual) = actual {
            ensure!(actual <= 1, "actual must be 0 or 1, got {}", actual);
        }

        let mut state = self.state();
        state.pending_predictions.push(PredictionRecord {
            timestamp: Utc::now(),
            features,
            prediction,
            probability,
            actual,
        });
        state.total_predictions += 1;

        if state.pending_predictions.len() >= self.flush_every {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Write buffered predictions. Returns how many were written.
    pub fn flush(&self) -> Result<usize> {
        let mut state = self.state();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut MonitorState) -> Result<usize> {
        let count = state.pending_predictions.len();
        if count == 0 {
            return Ok(0);
        }
        self.predictions.append(&state.pending_predictions)?;
        state.pending_predictions.clear();
        debug!(count, path = %self.predictions.path().display(), "Flushed prediction log");
        Ok(count)
    }

    pub fn pending_predictions(&self) -> usize {
        self.state().pending_predictions.len()
    }

    pub fn total_predictions(&self) -> u64 {
        self.state().total_predictions
    }

    /// Compare newly observed feature values with the baseline and record the result.
    pub fn detect_data_drift(&self, current: &Distribution) -> Result<DriftReport> {
        let report = self.detector.detect(current);

        let mut state = self.state();
        self.drift.append(std::slice::from_ref(&report))?;
        if report.drift_detected {
            state.drift_detected_count += 1;
        }
        push_bounded(&mut state.recent_drift, report.clone(), REPORT_DRIFT_WINDOW);
        Ok(report)
    }

    /// Evaluate labelled predictions and record the metrics.
    pub fn calculate_performance_metrics(
        &self,
        predictions: &[u8],
        actuals: &[u8],
    ) -> Result<PerformanceMetrics> {
        let metrics = PerformanceMetrics::compute(predictions, actuals)?;

        let mut state = self.state();
        self.performance.append(std::slice::from_ref(&metrics))?;
        state.performance_runs += 1;
        state.precision_sum += metrics.precision;
        state.recall_sum += metrics.recall;
        push_bounded(
            &mut state.recent_performance,
            metrics.clone(),
            REPORT_PERFORMANCE_WINDOW,
        );

        info!(
            samples = metrics.n_samples,
            precision = %format!("{:.4}", metrics.precision),
            recall = %format!("{:.4}", metrics.recall),
            f1 = %format!("{:.4}", metrics.f1_score),
            "Performance metrics calculated"
        );
        Ok(metrics)
    }

    /// Raise and record alerts for metrics below the configured floors.
    pub fn check_for_alerts(&self, metrics: &PerformanceMetrics) -> Result<Vec<MonitoringAlert>> {
        let alerts = self.thresholds.evaluate(metrics);
        if alerts.is_empty() {
            return Ok(alerts);
        }

        let mut state = self.state();
        self.alerts.append(&alerts)?;
        state.alerts_raised += alerts.len() as u64;

        warn!(count = alerts.len(), "Alert(s) triggered");
        for alert in &alerts {
            warn!(
                alert_id = %alert.alert_id,
                severity = %alert.severity,
                "{}",
                alert.message
            );
        }
        Ok(alerts)
    }

    /// Snapshot of the monitor, also written to `monitoring_report.json`.
    pub fn generate_report(&self) -> Result<MonitoringReport> {
        let report = {
            let state = self.state();
            let runs = state.performance_runs;
            let average = |sum: f64| if runs > 0 { sum / runs as f64 } else { 0.0 };
            MonitoringReport {
                generated_at: Utc::now(),
                total_predictions: state.total_predictions,
                performance_metrics: state.recent_performance.iter().cloned().collect(),
                drift_detections: state.recent_drift.iter().cloned().collect(),
                summary: ReportSummary {
                    avg_precision: average(state.precision_sum),
                    avg_recall: average(state.recall_sum),
                    drift_detected_count: state.drift_detected_count,
                    alerts_raised: state.alerts_raised,
                },
            }
        };

        let path = self.log_dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(
            path = %path.display(),
            total_predictions = report.total_predictions,
            drift_detected_count = report.summary.drift_detected_count,
            "Monitoring report generated"
        );
        Ok(report)
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, item: T, cap: usize) {
    if window.len() == cap {
        window.pop_front();
    }
    window.push_back(item);
}

/// Flush the prediction buffer on a fixed interval until the task is aborted.
pub fn spawn_periodic_flush(monitor: Arc<FraudMonitor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match monitor.flush() {
                Ok(0) => {}
                Ok(count) => debug!(count, "Periodic flush"),
                Err(e) => error!(error = %e, "Periodic flush failed"),
            }
        }
    })
}
