//! Monitoring alert data structures

use crate::monitoring::performance::PerformanceMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowPrecision,
    LowRecall,
}

impl AlertType {
    pub fn severity(self) -> Severity {
        match self {
            AlertType::LowPrecision => Severity::High,
            // Missed fraud costs more than false alarms.
            AlertType::LowRecall => Severity::Critical,
        }
    }
}

/// Configurable performance floors
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub min_precision: f64,
    pub min_recall: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_precision: 0.2,
            min_recall: 0.7,
        }
    }
}

impl AlertThresholds {
    /// Alerts raised by one evaluation, precision first.
    pub fn evaluate(&self, metrics: &PerformanceMetrics) -> Vec<MonitoringAlert> {
        let mut alerts = Vec::new();
        if metrics.precision < self.min_precision {
            alerts.push(MonitoringAlert::new(
                AlertType::LowPrecision,
                format!("Precision dropped to {:.4}", metrics.precision),
                metrics.precision,
                self.min_precision,
            ));
        }
        if metrics.recall < self.min_recall {
            alerts.push(MonitoringAlert::new(
                AlertType::LowRecall,
                format!("Recall dropped to {:.4}", metrics.recall),
                metrics.recall,
                self.min_recall,
            ));
        }
        alerts
    }
}

/// Alert raised when model performance falls below a floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringAlert {
    /// Unique alert identifier
    pub alert_id: String,

    #[serde(rename = "type")]
    pub alert_type: AlertType,

    pub severity: Severity,

    pub message: String,

    /// Observed metric value
    pub value: f64,

    /// Floor that was crossed
    pub threshold: f64,

    pub timestamp: DateTime<Utc>,
}

impl MonitoringAlert {
    pub fn new(alert_type: AlertType, message: String, value: f64, threshold: f64) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            alert_type,
            severity: alert_type.severity(),
            message,
            value,
            threshold,
            timestamp: Utc::now(),
        }
    }
}
