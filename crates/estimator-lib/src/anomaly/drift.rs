//! Drift signal over the monitoring window

/// Default share of outliers above which drift is reported (20%)
pub const DEFAULT_DRIFT_RATIO: f64 = 0.2;

/// Reports drift when the outlier share of the window strictly exceeds a ratio
#[derive(Debug, Clone, Copy)]
pub struct DriftPolicy {
    pub max_outlier_ratio: f64,
}

impl DriftPolicy {
    pub fn new(max_outlier_ratio: f64) -> Self {
        Self { max_outlier_ratio }
    }

    /// An empty window never reports drift
    pub fn is_drifting(&self, outlier_count: usize, total: usize) -> bool {
        total > 0 && outlier_count as f64 > total as f64 * self.max_outlier_ratio
    }
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_RATIO)
    }
}
