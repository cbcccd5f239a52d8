//! Configuration management for the feature pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub artifact: ArtifactConfig,
    pub drift: DriftConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

/// Input and output dataset locations
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Labelled training records (CSV)
    pub training_path: PathBuf,
    /// Recently observed records to check for drift (CSV, optional)
    #[serde(default)]
    pub current_path: Option<PathBuf>,
    /// Processed training matrix, kept as the drift baseline
    pub baseline_path: PathBuf,
}

/// Preprocessor artifact location
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    pub path: PathBuf,
}

/// Drift detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriftConfig {
    /// A column drifts when its KS p-value falls below this
    #[serde(default = "default_p_value_threshold")]
    pub p_value_threshold: f64,
    /// Minimum non-missing samples on each side before a column is tested
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Largest n*m for which the exact KS p-value is computed
    #[serde(default = "default_exact_max_cells")]
    pub exact_max_cells: usize,
}

fn default_p_value_threshold() -> f64 {
    0.05
}

fn default_min_samples() -> usize {
    1
}

fn default_exact_max_cells() -> usize {
    1_000_000
}

/// Monitoring log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Directory holding the append-only monitoring logs
    pub log_dir: PathBuf,
    /// Flush the prediction log every N predictions
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Interval of the background flush task
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Precision below this raises a HIGH alert
    #[serde(default = "default_min_precision")]
    pub min_precision: f64,
    /// Recall below this raises a CRITICAL alert
    #[serde(default = "default_min_recall")]
    pub min_recall: f64,
}

fn default_flush_every() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_min_precision() -> f64 {
    0.2
}

fn default_min_recall() -> f64 {
    0.7
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                training_path: PathBuf::from("data/raw/transactions.csv"),
                current_path: None,
                baseline_path: PathBuf::from("data/processed/X_processed.csv"),
            },
            artifact: ArtifactConfig {
                path: PathBuf::from("models/saved_models/fraud_preprocessor.json"),
            },
            drift: DriftConfig::default(),
            monitoring: MonitoringConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            p_value_threshold: default_p_value_threshold(),
            min_samples: default_min_samples(),
            exact_max_cells: default_exact_max_cells(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs/monitoring"),
            flush_every: default_flush_every(),
            flush_interval_secs: default_flush_interval_secs(),
            min_precision: default_min_precision(),
            min_recall: default_min_recall(),
        }
    }
}
