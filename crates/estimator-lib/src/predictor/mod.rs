//! Model resource and inference backends

mod graph;
mod inference;
mod resource;

pub use graph::MlGraph;
pub use inference::OnnxPredictor;
pub use resource::{load_metadata, LoadedModel, ModelPaths, ModelResource};

use crate::models::CarFeatures;
use anyhow::Result;

/// Trait for inference backends
///
/// The pipeline only depends on this capability, so the artifact format can
/// change without touching validation, outlier or monitoring logic.
pub trait Predictor: Send + Sync {
    /// Predict a price for one row of features
    fn predict(&self, features: &CarFeatures) -> Result<f64>;

    /// Counters kept by the backend, zero for backends that keep none
    fn stats(&self) -> InferenceStats {
        InferenceStats::default()
    }
}

/// Inference statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}
