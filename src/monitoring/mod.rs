//! Drift detection and production monitoring

pub mod drift;
pub mod ks;
pub mod monitor;
pub mod performance;
pub mod store;

pub use drift::{ColumnSamples, Distribution, DriftDetector, DriftReport};
pub use monitor::{spawn_periodic_flush, FraudMonitor, MonitoringReport};
pub use performance::PerformanceMetrics;
