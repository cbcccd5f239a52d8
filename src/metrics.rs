//! Run statistics for the preprocessing pipeline and drift scans.

use crate::monitoring::drift::DriftReport;
use crate::preprocessing::pipeline::Transformed;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector shared by everything that transforms or scans data
pub struct PipelineMetrics {
    /// Batches passed through fit or transform
    pub batches_transformed: AtomicU64,
    /// Rows in those batches
    pub rows_transformed: AtomicU64,
    /// Categorical values that mapped to the unseen sentinel
    pub unseen_categories: AtomicU64,
    /// Drift scans run
    pub drift_runs: AtomicU64,
    /// Drift scans that flagged at least one column
    pub drift_detections: AtomicU64,
    /// Per-batch transform latency (in microseconds)
    batch_times: RwLock<Vec<u64>>,
    /// How often each column has been flagged as drifted
    drift_by_feature: RwLock<HashMap<String, u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            batches_transformed: AtomicU64::new(0),
            rows_transformed: AtomicU64::new(0),
            unseen_categories: AtomicU64::new(0),
            drift_runs: AtomicU64::new(0),
            drift_detections: AtomicU64::new(0),
            batch_times: RwLock::new(Vec::with_capacity(1000)),
            drift_by_feature: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one transformed batch
    pub fn record_batch(&self, elapsed: Duration, transformed: &Transformed) {
        self.batches_transformed.fetch_add(1, Ordering::Relaxed);
        self.rows_transformed
            .fetch_add(transformed.matrix.n_rows() as u64, Ordering::Relaxed);
        self.unseen_categories
            .fetch_add(transformed.unseen_categories as u64, Ordering::Relaxed);

        let mut times = self.batch_times.write().unwrap_or_else(PoisonError::into_inner);
        times.push(elapsed.as_micros() as u64);
        if times.len() > MAX_LATENCY_SAMPLES {
            times.drain(0..MAX_LATENCY_SAMPLES / 2);
        }
    }

    /// Record one drift scan
    pub fn record_drift(&self, report: &DriftReport) {
        self.drift_runs.fetch_add(1, Ordering::Relaxed);
        if !report.drift_detected {
            return;
        }
        self.drift_detections.fetch_add(1, Ordering::Relaxed);

        let mut by_feature = self
            .drift_by_feature
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for feature in report.drifted_features() {
            *by_feature.entry(feature.to_string()).or_insert(0) += 1;
        }
    }

    /// Batch latency statistics
    pub fn get_batch_stats(&self) -> LatencyStats {
        let times = self.batch_times.read().unwrap_or_else(PoisonError::into_inner);
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Rows per second since creation
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows_transformed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_drift_by_feature(&self) -> HashMap<String, u64> {
        self.drift_by_feature
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let batches = self.batches_transformed.load(Ordering::Relaxed);
        let rows = self.rows_transformed.load(Ordering::Relaxed);
        let unseen = self.unseen_categories.load(Ordering::Relaxed);
        let drift_runs = self.drift_runs.load(Ordering::Relaxed);
        let drift_detections = self.drift_detections.load(Ordering::Relaxed);
        let latency = self.get_batch_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          FRAUD FEATURE PIPELINE - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batches: {:>8}  │  Rows: {:>10}  │  {:>8.1} rows/s ║",
            batches,
            rows,
            self.get_throughput()
        );
        info!("║ Unseen categorical values: {:>10}                        ║", unseen);
        info!(
            "║ Batch Time (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6} ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Drift scans: {:>6}  │  with drift: {:>6}                     ║",
            drift_runs, drift_detections
        );

        let mut by_feature: Vec<(String, u64)> = self.get_drift_by_feature().into_iter().collect();
        by_feature.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (feature, count) in &by_feature {
            info!("║   {:<32}: {:>6}                   ║", feature, count);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch latency statistics
#[derive(Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
