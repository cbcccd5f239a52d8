//! Type definitions shared across the pipeline and its monitor

pub mod alert;
pub mod transaction;

pub use alert::{AlertThresholds, AlertType, MonitoringAlert, Severity};
pub use transaction::{Record, Transaction};
