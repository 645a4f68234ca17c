//! Observability infrastructure for the price estimator
//!
//! Provides:
//! - Prometheus metrics (prediction latency, outcome counters, window size, model info)
//! - Structured JSON logging with tracing

use crate::models::CarFeatures;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, GaugeVec,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ServiceMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounter,
    outliers_total: IntCounter,
    validation_failures_total: IntCounter,
    inference_errors_total: IntCounter,
    monitoring_window_size: IntGauge,
    drift_detected: IntGauge,
    model_loaded: IntGauge,
    model_info: GaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "eco_price_prediction_latency_seconds",
                "Time spent serving a prediction, validation through logging",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter!(
                "eco_price_predictions_total",
                "Total number of predictions served"
            )
            .expect("Failed to register predictions_total"),

            outliers_total: register_int_counter!(
                "eco_price_outliers_total",
                "Total number of predictions flagged as outliers"
            )
            .expect("Failed to register outliers_total"),

            validation_failures_total: register_int_counter!(
                "eco_price_validation_failures_total",
                "Total number of requests rejected by validation"
            )
            .expect("Failed to register validation_failures_total"),

            inference_errors_total: register_int_counter!(
                "eco_price_inference_errors_total",
                "Total number of failed model invocations"
            )
            .expect("Failed to register inference_errors_total"),

            monitoring_window_size: register_int_gauge!(
                "eco_price_monitoring_window_size",
                "Number of predictions currently retained in the monitoring window"
            )
            .expect("Failed to register monitoring_window_size"),

            drift_detected: register_int_gauge!(
                "eco_price_drift_detected",
                "1 if the outlier rate of the monitoring window signals drift"
            )
            .expect("Failed to register drift_detected"),

            model_loaded: register_int_gauge!(
                "eco_price_model_loaded",
                "1 if the model resource loaded successfully"
            )
            .expect("Failed to register model_loaded"),

            model_info: register_gauge_vec!(
                "eco_price_model_info",
                "Information about the currently loaded model",
                &["version", "checksum"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    pub fn inc_outliers(&self) {
        self.inner().outliers_total.inc();
    }

    pub fn inc_validation_failures(&self) {
        self.inner().validation_failures_total.inc();
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors_total.inc();
    }

    /// Update window gauges after an append
    pub fn set_monitoring_window(&self, size: usize, drift_detected: bool) {
        self.inner().monitoring_window_size.set(size as i64);
        self.inner().drift_detected.set(drift_detected as i64);
    }

    pub fn set_model_loaded(&self, loaded: bool) {
        self.inner().model_loaded.set(loaded as i64);
    }

    /// Update model info
    pub fn set_model_info(&self, version: &str, checksum: &str) {
        // Reset previous version
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[version, checksum])
            .set(1.0);
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for predictions,
/// outliers, model loading and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a served prediction
    pub fn log_prediction(&self, features: &CarFeatures, price: f64, confidence: f64, is_outlier: bool) {
        info!(
            event = "prediction_served",
            service = %self.service,
            brand = %features.brand,
            mileage = features.mileage,
            year = features.year,
            fuel_type = %features.fuel_type,
            predicted_price = price,
            confidence = confidence,
            is_outlier = is_outlier,
            "Served price prediction"
        );
    }

    /// Log an outlier classification with the matched rules
    pub fn log_outlier(&self, features: &CarFeatures, reasons: &[&str]) {
        warn!(
            event = "outlier_detected",
            service = %self.service,
            brand = %features.brand,
            mileage = features.mileage,
            year = features.year,
            reasons = ?reasons,
            "Request outside training distribution"
        );
    }

    /// Log the window crossing the drift threshold
    pub fn log_drift(&self, outlier_count: usize, total_requests: usize) {
        warn!(
            event = "drift_detected",
            service = %self.service,
            outlier_count = outlier_count,
            total_requests = total_requests,
            "Outlier rate exceeds drift threshold"
        );
    }

    /// Log a failed model invocation
    pub fn log_prediction_failed(&self, features: &CarFeatures, error: &anyhow::Error) {
        error!(
            event = "prediction_failed",
            service = %self.service,
            brand = %features.brand,
            mileage = features.mileage,
            year = features.year,
            error = %format!("{:#}", error),
            "Model invocation failed"
        );
    }

    /// Log a successful model load
    pub fn log_model_loaded(&self, checksum: Option<&str>, r2_score: f64, known_brands: usize) {
        info!(
            event = "model_loaded",
            service = %self.service,
            checksum = ?checksum,
            r2_score = r2_score,
            known_brands = known_brands,
            "Model loaded successfully"
        );
    }

    /// Log a failed model load; the service stays up but unavailable
    pub fn log_model_load_failed(&self, reason: &str) {
        error!(
            event = "model_load_failed",
            service = %self.service,
            reason = %reason,
            "Failed to load model, serving 503 until restart"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_version: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            model_version = %model_version,
            "Price estimator started"
        );
    }

    /// Log backend counters accumulated over the process lifetime
    pub fn log_inference_stats(&self, total_inferences: u64, slow_inferences: u64) {
        info!(
            event = "inference_stats",
            service = %self.service,
            total_inferences = total_inferences,
            slow_inferences = slow_inferences,
            "Inference statistics"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Price estimator shutting down"
        );
    }
}
