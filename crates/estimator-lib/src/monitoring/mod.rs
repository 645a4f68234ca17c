//! Bounded in-memory log of recent predictions
//!
//! Holds the last [`DEFAULT_CAPACITY`] served predictions and computes
//! aggregate statistics over that window on demand. Contents are not
//! persisted and are lost on restart.

mod window;

pub use window::RingWindow;

use crate::anomaly::DriftPolicy;
use crate::models::{LogEntry, MonitoringSnapshot};
use tokio::sync::RwLock;

/// Maximum number of retained entries
pub const DEFAULT_CAPACITY: usize = 100;

/// Number of entries returned in a snapshot
pub const DEFAULT_RECENT: usize = 10;

/// Aggregates over the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub total_requests: usize,
    pub outlier_count: usize,
    pub drift_detected: bool,
    /// Set only by the append that moved the window into drift
    pub drift_started: bool,
}

/// Monitoring log shared by all request handlers
///
/// The window is only reachable through [`append`](Self::append) and
/// [`snapshot`](Self::snapshot); the lock serializes appends and gives
/// snapshots a consistent point-in-time view.
#[derive(Debug)]
pub struct MonitoringLog {
    window: RwLock<RingWindow<LogEntry>>,
    capacity: usize,
    recent: usize,
    drift: DriftPolicy,
}

impl Default for MonitoringLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringLog {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CAPACITY, DEFAULT_RECENT, DriftPolicy::default())
    }

    pub fn with_config(capacity: usize, recent: usize, drift: DriftPolicy) -> Self {
        let window = RingWindow::new(capacity);
        Self {
            capacity: window.capacity(),
            window: RwLock::new(window),
            recent,
            drift,
        }
    }

    /// Append one entry, evicting the oldest when full
    ///
    /// Returns the window statistics as of right after this append. The
    /// before/after comparison happens under the write lock, so exactly one
    /// of several concurrent appends sees `drift_started`.
    pub async fn append(&self, entry: LogEntry) -> WindowStats {
        let mut window = self.window.write().await;
        let was_drifting = self.stats(&window).drift_detected;
        window.push(entry);

        let mut stats = self.stats(&window);
        stats.drift_started = stats.drift_detected && !was_drifting;
        stats
    }

    /// Aggregate statistics and the most recent entries
    pub async fn snapshot(&self) -> MonitoringSnapshot {
        let window = self.window.read().await;
        let stats = self.stats(&window);

        MonitoringSnapshot {
            total_requests: stats.total_requests,
            outlier_count: stats.outlier_count,
            drift_detected: stats.drift_detected,
            recent_logs: window.latest(self.recent).cloned().collect(),
        }
    }

    fn stats(&self, window: &RingWindow<LogEntry>) -> WindowStats {
        let total_requests = window.len();
        let outlier_count = window.iter().filter(|e| e.is_outlier).count();

        WindowStats {
            total_requests,
            outlier_count,
            drift_detected: self.drift.is_drifting(outlier_count, total_requests),
            drift_started: false,
        }
    }

    pub async fn len(&self) -> usize {
        self.window.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.window.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
