//! Core data models for the price estimator

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Version reported with every prediction served by this pipeline
pub const MODEL_VERSION: &str = "1.0";

/// Prediction request as submitted over the wire, before validation
///
/// Every field is optional so that validation can report all missing
/// fields at once instead of failing on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub brand: Option<String>,
    pub mileage: Option<f64>,
    pub year: Option<i64>,
    pub fuel_type: Option<String>,
}

/// Validated and normalized request, the only input the model ever sees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarFeatures {
    pub brand: String,
    pub mileage: f64,
    pub year: i32,
    pub fuel_type: String,
}

/// Reference data produced alongside the trained artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(rename = "brands", default)]
    pub known_brands: BTreeSet<String>,
    #[serde(rename = "fuel_types", default)]
    pub known_fuel_types: BTreeSet<String>,
    #[serde(default)]
    pub r2_score: f64,
}

impl ModelMetadata {
    /// Exact membership of an already normalized brand
    pub fn is_known_brand(&self, brand: &str) -> bool {
        self.known_brands.contains(brand)
    }
}

/// Response returned for a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_price: f64,
    pub model_version: String,
    pub confidence_score: f64,
}

/// Request fields retained in the monitoring log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRequest {
    pub brand: String,
    pub mileage: f64,
    pub year: i32,
}

impl From<&CarFeatures> for LoggedRequest {
    fn from(features: &CarFeatures) -> Self {
        Self {
            brand: features.brand.clone(),
            mileage: features.mileage,
            year: features.year,
        }
    }
}

/// One served prediction, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 creation time
    pub timestamp: String,
    pub request: LoggedRequest,
    pub price: f64,
    pub is_outlier: bool,
}

/// Aggregate view over the current monitoring window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    /// Requests currently retained in the window, not a lifetime count
    pub total_requests: usize,
    pub outlier_count: usize,
    pub drift_detected: bool,
    /// Most recent entries, oldest first
    #[serde(rename = "logs")]
    pub recent_logs: Vec<LogEntry>,
}

/// Round a price to cents for every external-facing use, ties to even
pub fn round_price(price: f64) -> f64 {
    (price * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_document_field_names() {
        let json = r#"{"brands": ["Toyota", "BMW"], "fuel_types": ["Diesel"], "r2_score": 0.91}"#;
        let metadata: ModelMetadata = serde_json::from_str(json).unwrap();

        assert!(metadata.is_known_brand("Toyota"));
        assert!(metadata.is_known_brand("BMW"));
        assert!(!metadata.is_known_brand("Lada"));
        assert!(metadata.known_fuel_types.contains("Diesel"));
        assert_eq!(metadata.r2_score, 0.91);
    }

    #[test]
    fn test_brand_membership_is_exact() {
        let json = r#"{"brands": ["BMW", "Toyota"]}"#;
        let metadata: ModelMetadata = serde_json::from_str(json).unwrap();

        assert!(!metadata.is_known_brand("Bmw"));
        assert!(!metadata.is_known_brand("toyota"));
    }

    #[test]
    fn test_metadata_missing_fields_default() {
        let metadata: ModelMetadata = serde_json::from_str("{}").unwrap();
        assert!(metadata.known_brands.is_empty());
        assert_eq!(metadata.r2_score, 0.0);
    }

    #[test]
    fn test_round_price_to_cents() {
        assert_eq!(round_price(12345.678), 12345.68);
        assert_eq!(round_price(99.994), 99.99);
        assert_eq!(round_price(-3.456), -3.46);
    }

    #[test]
    fn test_round_price_half_cent_ties_to_even() {
        assert_eq!(round_price(18250.125), 18250.12);
        assert_eq!(round_price(18250.375), 18250.38);
        assert_eq!(round_price(0.5), 0.5);
    }

    #[test]
    fn test_snapshot_serializes_logs_key() {
        let snapshot = MonitoringSnapshot {
            total_requests: 0,
            outlier_count: 0,
            drift_detected: false,
            recent_logs: Vec::new(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["logs"].is_array());
        assert!(value.get("recent_logs").is_none());
    }
}
