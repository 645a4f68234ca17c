//! Prediction pipeline
//!
//! One request flows through: availability check, validation, model
//! invocation, outlier classification, monitoring log append, response.
//! A request rejected at any step before the append leaves no log entry.

use crate::anomaly::{OutlierDetector, RuleBasedDetector};
use crate::error::{PredictError, ValidationErrors};
use crate::health::{self, HealthReport};
use crate::models::{
    round_price, CarFeatures, LogEntry, LoggedRequest, MonitoringSnapshot, PredictionRequest,
    PredictionResult, MODEL_VERSION,
};
use crate::monitoring::MonitoringLog;
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::predictor::ModelResource;
use crate::validation;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Confidence reported for in-distribution requests
pub const CONFIDENCE_NORMAL: f64 = 0.95;

/// Confidence reported for flagged outliers
pub const CONFIDENCE_OUTLIER: f64 = 0.5;

/// Service context built once at startup and shared by every handler
pub struct EstimatorService {
    resource: ModelResource,
    detector: Box<dyn OutlierDetector>,
    log: MonitoringLog,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl EstimatorService {
    /// Create a service with the default outlier rules and monitoring window
    pub fn new(resource: ModelResource, logger: StructuredLogger) -> Self {
        Self::with_components(
            resource,
            Box::new(RuleBasedDetector::default()),
            MonitoringLog::new(),
            logger,
        )
    }

    pub fn with_components(
        resource: ModelResource,
        detector: Box<dyn OutlierDetector>,
        log: MonitoringLog,
        logger: StructuredLogger,
    ) -> Self {
        let metrics = ServiceMetrics::new();
        metrics.set_model_loaded(resource.is_available());
        if let Some(model) = resource.available() {
            metrics.set_model_info(MODEL_VERSION, model.checksum().unwrap_or("unknown"));
        }

        Self {
            resource,
            detector,
            log,
            metrics,
            logger,
        }
    }

    pub fn resource(&self) -> &ModelResource {
        &self.resource
    }

    /// Serve one prediction request end to end
    pub async fn predict(&self, request: PredictionRequest) -> Result<PredictionResult, PredictError> {
        self.serve(|| validation::validate(&request)).await
    }

    /// Serve a request given as a raw JSON document
    ///
    /// Unlike [`predict`](Self::predict), field type errors are reported
    /// per field together with range errors.
    pub async fn predict_json(&self, body: &Value) -> Result<PredictionResult, PredictError> {
        self.serve(|| validation::validate_json(body)).await
    }

    async fn serve(
        &self,
        validate: impl FnOnce() -> Result<CarFeatures, ValidationErrors>,
    ) -> Result<PredictionResult, PredictError> {
        let start = Instant::now();

        let model = self.resource.available().ok_or(PredictError::Unavailable)?;

        let features = validate().map_err(|errors| {
            self.metrics.inc_validation_failures();
            debug!(errors = %errors, "Rejected prediction request");
            PredictError::Validation(errors)
        })?;

        let raw_price = model.predict(&features).map_err(|e| {
            self.metrics.inc_inference_errors();
            self.logger.log_prediction_failed(&features, &e);
            PredictError::Invocation(e)
        })?;
        let price = round_price(raw_price);

        let metadata = model.metadata();
        let is_outlier = self.detector.is_outlier(&features, metadata);
        if is_outlier {
            self.metrics.inc_outliers();
            self.logger
                .log_outlier(&features, &self.detector.reasons(&features, metadata));
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            request: LoggedRequest::from(&features),
            price,
            is_outlier,
        };
        let stats = self.log.append(entry).await;
        self.metrics
            .set_monitoring_window(stats.total_requests, stats.drift_detected);

        if stats.drift_started {
            self.logger.log_drift(stats.outlier_count, stats.total_requests);
        }

        let confidence_score = if is_outlier {
            CONFIDENCE_OUTLIER
        } else {
            CONFIDENCE_NORMAL
        };

        self.metrics.inc_predictions();
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        self.logger
            .log_prediction(&features, price, confidence_score, is_outlier);

        Ok(PredictionResult {
            predicted_price: price,
            model_version: MODEL_VERSION.to_string(),
            confidence_score,
        })
    }

    /// Health of the model resource
    pub fn health(&self) -> Result<HealthReport, PredictError> {
        health::report(&self.resource)
    }

    /// Current monitoring snapshot; available even when the model is not
    pub async fn monitoring(&self) -> MonitoringSnapshot {
        self.log.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelMetadata;
    use serde_json::json;
    use crate::predictor::Predictor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a fixed price and counts invocations
    struct CountingPredictor {
        price: f64,
        calls: Arc<AtomicUsize>,
    }

    impl Predictor for CountingPredictor {
        fn predict(&self, _features: &CarFeatures) -> anyhow::Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn predict(&self, _features: &CarFeatures) -> anyhow::Result<f64> {
            anyhow::bail!("tensor shape mismatch")
        }
    }

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            known_brands: ["Toyota", "BMW", "Audi"].iter().map(|s| s.to_string()).collect(),
            known_fuel_types: ["Gasoline", "Diesel"].iter().map(|s| s.to_string()).collect(),
            r2_score: 0.92,
        }
    }

    fn service_with_price(price: f64) -> (EstimatorService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let predictor = CountingPredictor {
            price,
            calls: calls.clone(),
        };
        let resource = ModelResource::with_predictor(predictor, metadata());
        (EstimatorService::new(resource, StructuredLogger::new("test")), calls)
    }

    fn request(brand: &str, mileage: f64, year: i64) -> PredictionRequest {
        PredictionRequest {
            brand: Some(brand.to_string()),
            mileage: Some(mileage),
            year: Some(year),
            fuel_type: Some("Gasoline".to_string()),
        }
    }

    #[tokio::test]
    async fn test_normal_request_high_confidence() {
        let (service, _) = service_with_price(18_234.567);

        let result = service.predict(request("toyota", 50_000.0, 2020)).await.unwrap();
        assert_eq!(result.predicted_price, 18_234.57);
        assert_eq!(result.model_version, MODEL_VERSION);
        assert_eq!(result.confidence_score, CONFIDENCE_NORMAL);

        let snapshot = service.monitoring().await;
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.recent_logs[0].request.brand, "Toyota");
        assert_eq!(snapshot.recent_logs[0].price, 18_234.57);
        assert!(!snapshot.recent_logs[0].is_outlier);
    }

    #[tokio::test]
    async fn test_outlier_request_low_confidence() {
        let (service, _) = service_with_price(900.0);

        let result = service.predict(request("Toyota", 1_000_000.0, 1950)).await.unwrap();
        assert_eq!(result.confidence_score, CONFIDENCE_OUTLIER);

        let snapshot = service.monitoring().await;
        assert_eq!(snapshot.outlier_count, 1);
        assert!(snapshot.drift_detected);
    }

    #[tokio::test]
    async fn test_unknown_brand_is_outlier() {
        let (service, _) = service_with_price(10_000.0);
        let result = service.predict(request("lada", 20_000.0, 2018)).await.unwrap();
        assert_eq!(result.confidence_score, CONFIDENCE_OUTLIER);
    }

    #[tokio::test]
    async fn test_acronym_brand_normalized_then_flagged() {
        let (service, _) = service_with_price(30_000.0);
        let result = service.predict(request("BMW", 20_000.0, 2021)).await.unwrap();
        assert_eq!(result.confidence_score, CONFIDENCE_OUTLIER);

        let snapshot = service.monitoring().await;
        assert_eq!(snapshot.recent_logs[0].request.brand, "Bmw");
        assert!(snapshot.recent_logs[0].is_outlier);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_model_and_log() {
        let (service, calls) = service_with_price(10_000.0);

        let err = service.predict(request("x", -10.0, 1800)).await.unwrap_err();
        match err {
            PredictError::Validation(errors) => {
                assert_eq!(errors.fields(), vec!["brand", "mileage", "year"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(service.monitoring().await.recent_logs.is_empty());
    }

    #[tokio::test]
    async fn test_json_type_errors_skip_model_and_log() {
        let (service, calls) = service_with_price(10_000.0);

        let body = json!({"brand": "x", "mileage": "abc", "year": 3000});
        let err = service.predict_json(&body).await.unwrap_err();
        match err {
            PredictError::Validation(errors) => {
                assert_eq!(errors.fields(), vec!["brand", "mileage", "year", "fuel_type"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.monitoring().await.total_requests, 0);
    }

    #[tokio::test]
    async fn test_json_request_served() {
        let (service, _) = service_with_price(21_000.0);

        let body = json!({"brand": "toyota", "mileage": 42000, "year": 2020.0, "fuel_type": "Hybrid"});
        let result = service.predict_json(&body).await.unwrap();
        assert_eq!(result.predicted_price, 21_000.0);
        assert_eq!(result.confidence_score, CONFIDENCE_NORMAL);
    }

    #[tokio::test]
    async fn test_unavailable_checked_before_validation() {
        let service = EstimatorService::new(
            ModelResource::unavailable("no artifact"),
            StructuredLogger::new("test"),
        );

        let err = service.predict(PredictionRequest::default()).await.unwrap_err();
        assert!(matches!(err, PredictError::Unavailable));
        let err = service.predict_json(&json!("not an object")).await.unwrap_err();
        assert!(matches!(err, PredictError::Unavailable));
        assert!(service.health().is_err());
        assert_eq!(service.monitoring().await.total_requests, 0);
    }

    #[tokio::test]
    async fn test_invocation_error_propagates_without_log_entry() {
        let resource = ModelResource::with_predictor(FailingPredictor, metadata());
        let service = EstimatorService::new(resource, StructuredLogger::new("test"));

        let err = service.predict(request("Audi", 1_000.0, 2022)).await.unwrap_err();
        assert!(matches!(err, PredictError::Invocation(_)));
        assert_eq!(service.monitoring().await.total_requests, 0);
    }

    #[tokio::test]
    async fn test_window_capped_after_many_predictions() {
        let (service, calls) = service_with_price(5_000.0);
        for i in 0..120 {
            service
                .predict(request("Audi", 1_000.0 * i as f64, 2015))
                .await
                .unwrap();
        }

        let snapshot = service.monitoring().await;
        assert_eq!(calls.load(Ordering::SeqCst), 120);
        assert_eq!(snapshot.total_requests, 100);
        assert_eq!(snapshot.recent_logs.len(), 10);
        assert_eq!(snapshot.recent_logs[9].request.mileage, 119_000.0);
    }

    #[tokio::test]
    async fn test_health_reports_r2() {
        let (service, _) = service_with_price(1.0);
        let report = service.health().unwrap();
        assert_eq!(report.r2_score, 0.92);
        assert!(report.model_loaded);
    }
}
