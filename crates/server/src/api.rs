//! HTTP API for predictions, monitoring, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use estimator_lib::{
    EstimatorService, HealthReport, MonitoringSnapshot, PredictError, PredictionResult,
    ValidationErrors,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state
pub struct AppState {
    pub service: EstimatorService,
    pub frontend_path: PathBuf,
}

impl AppState {
    pub fn new(service: EstimatorService, frontend_path: impl Into<PathBuf>) -> Self {
        Self {
            service,
            frontend_path: frontend_path.into(),
        }
    }
}

/// Error type rendered as a JSON response
#[derive(Debug)]
pub enum ApiError {
    Predict(PredictError),
    NotFound(String),
    Internal(String),
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        ApiError::Predict(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Predict(PredictError::Unavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "Service Unavailable" }),
            ),
            ApiError::Predict(PredictError::Validation(errors)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "Validation failed", "detail": errors }),
            ),
            ApiError::Predict(PredictError::Invocation(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Model invocation failed" }),
            ),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, json!({ "error": what })),
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Health check - 200 with model details, 503 if the model is not loaded
async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(state.service.health()?))
}

/// Serve a price prediction
///
/// The body is taken as a plain JSON value so that field type errors are
/// reported per field by the service instead of as one opaque rejection.
async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    // Unavailability short-circuits before the body is even inspected
    if !state.service.resource().is_available() {
        return Err(PredictError::Unavailable.into());
    }

    let Json(body) = payload.map_err(|rejection| {
        PredictError::Validation(ValidationErrors::single("body", rejection.body_text()))
    })?;

    Ok(Json(state.service.predict_json(&body).await?))
}

/// Aggregate statistics over the monitoring window; always 200
async fn monitoring(State(state): State<Arc<AppState>>) -> Json<MonitoringSnapshot> {
    Json(state.service.monitoring().await)
}

/// Static landing page
async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    match tokio::fs::read_to_string(&state.frontend_path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) => {
            warn!(path = ?state.frontend_path, error = %e, "Landing page not available");
            Err(ApiError::NotFound("Not Found".to_string()))
        }
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/monitoring", get(monitoring))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
