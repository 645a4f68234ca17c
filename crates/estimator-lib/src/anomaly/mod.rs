//! Anomaly detection for incoming prediction requests
//!
//! This module provides:
//! - Per-request outlier classification against fixed sanity bounds
//! - Drift detection over the recent outlier rate

mod drift;
mod outlier;

pub use drift::{DriftPolicy, DEFAULT_DRIFT_RATIO};
pub use outlier::{OutlierDetector, OutlierReason, RuleBasedDetector};
