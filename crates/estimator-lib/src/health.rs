//! Health reporting over the model resource

use crate::error::PredictError;
use crate::predictor::ModelResource;
use serde::{Deserialize, Serialize};

/// Status string reported while the model is loaded
pub const STATUS_HEALTHY: &str = "healthy";

/// Health response, only produced when the model resource is available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    pub r2_score: f64,
}

/// Report health, or [`PredictError::Unavailable`] if the model failed to load
pub fn report(resource: &ModelResource) -> Result<HealthReport, PredictError> {
    let model = resource.available().ok_or(PredictError::Unavailable)?;

    Ok(HealthReport {
        status: STATUS_HEALTHY.to_string(),
        model_loaded: true,
        r2_score: model.metadata().r2_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CarFeatures, ModelMetadata};
    use crate::predictor::Predictor;

    struct ZeroPredictor;

    impl Predictor for ZeroPredictor {
        fn predict(&self, _features: &CarFeatures) -> anyhow::Result<f64> {
            Ok(0.0)
        }
    }

    #[test]
    fn test_healthy_report_carries_r2() {
        let metadata = ModelMetadata {
            r2_score: 0.93,
            ..Default::default()
        };
        let resource = ModelResource::with_predictor(ZeroPredictor, metadata);

        let report = report(&resource).unwrap();
        assert_eq!(report.status, "healthy");
        assert!(report.model_loaded);
        assert_eq!(report.r2_score, 0.93);
    }

    #[test]
    fn test_unavailable_resource_fails() {
        let resource = ModelResource::unavailable("missing artifact");
        assert!(matches!(report(&resource), Err(PredictError::Unavailable)));
    }
}
