//! Library for serving used-car price estimates
//!
//! This crate provides the core functionality for:
//! - Loading the trained model artifact and its metadata
//! - Request validation and normalization
//! - Outlier classification and drift detection
//! - A bounded monitoring log of recent predictions
//! - Health checks and observability

pub mod anomaly;
pub mod error;
pub mod health;
pub mod models;
pub mod monitoring;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod validation;

pub use error::{FieldViolation, LoadError, PredictError, ValidationErrors};
pub use health::HealthReport;
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use pipeline::EstimatorService;
pub use predictor::{InferenceStats, ModelPaths, ModelResource, Predictor};
