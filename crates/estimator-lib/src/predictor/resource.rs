//! Model resource: the loaded artifact plus its metadata document
//!
//! Loading happens once at startup. A failed load leaves the resource
//! permanently unavailable for the process; nothing retries it.

use super::{InferenceStats, OnnxPredictor, Predictor};
use crate::error::LoadError;
use crate::models::{CarFeatures, ModelMetadata};
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locations of the artifact and metadata document
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl ModelPaths {
    pub fn new(model_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            metadata_path: metadata_path.into(),
        }
    }
}

/// A successfully loaded model, immutable for the process lifetime
pub struct LoadedModel {
    predictor: Box<dyn Predictor>,
    metadata: ModelMetadata,
    checksum: Option<String>,
}

impl LoadedModel {
    /// Run the artifact on exactly one row of features
    pub fn predict(&self, features: &CarFeatures) -> Result<f64> {
        self.predictor.predict(features)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn inference_stats(&self) -> InferenceStats {
        self.predictor.stats()
    }

    /// SHA-256 of the artifact bytes, when loaded from disk
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("metadata", &self.metadata)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// Model resource in either the loaded or the unavailable state
#[derive(Debug)]
pub enum ModelResource {
    Loaded(LoadedModel),
    Unavailable { reason: String },
}

impl ModelResource {
    /// Load the artifact and metadata, falling back to the unavailable state
    pub fn load(paths: &ModelPaths) -> Self {
        match Self::try_load(paths) {
            Ok(model) => Self::Loaded(model),
            Err(e) => Self::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    /// Load the artifact and metadata, reporting the first failure
    pub fn try_load(paths: &ModelPaths) -> Result<LoadedModel, LoadError> {
        let bytes = fs::read(&paths.model_path).map_err(|source| LoadError::Io {
            path: paths.model_path.clone(),
            source,
        })?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        debug!(path = ?paths.model_path, size_bytes = bytes.len(), checksum = %checksum, "Read model artifact");

        let predictor = OnnxPredictor::new(&bytes).map_err(|source| LoadError::Artifact {
            path: paths.model_path.clone(),
            source,
        })?;

        let metadata = load_metadata(&paths.metadata_path)?;

        Ok(LoadedModel {
            predictor: Box::new(predictor),
            metadata,
            checksum: Some(checksum),
        })
    }

    /// Build an available resource around any predictor implementation
    pub fn with_predictor(predictor: impl Predictor + 'static, metadata: ModelMetadata) -> Self {
        Self::Loaded(LoadedModel {
            predictor: Box::new(predictor),
            metadata,
            checksum: None,
        })
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// The loaded model, if loading succeeded
    pub fn available(&self) -> Option<&LoadedModel> {
        match self {
            Self::Loaded(model) => Some(model),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available().is_some()
    }
}

/// Read and parse the metadata document
pub fn load_metadata(path: &Path) -> Result<ModelMetadata, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LoadError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct FixedPredictor(f64);

    impl Predictor for FixedPredictor {
        fn predict(&self, _features: &CarFeatures) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn write_temp(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_missing_artifact_is_unavailable() {
        let metadata = write_temp(br#"{"brands": ["Toyota"], "fuel_types": [], "r2_score": 0.9}"#);
        let paths = ModelPaths::new("/nonexistent/model.onnx", metadata.path());

        let resource = ModelResource::load(&paths);
        assert!(!resource.is_available());
        match resource {
            ModelResource::Unavailable { reason } => assert!(reason.contains("model.onnx")),
            ModelResource::Loaded(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_malformed_artifact_is_unavailable() {
        let artifact = write_temp(b"not a model");
        let metadata = write_temp(br#"{"brands": [], "fuel_types": [], "r2_score": 0.9}"#);
        let paths = ModelPaths::new(artifact.path(), metadata.path());

        let err = ModelResource::try_load(&paths).unwrap_err();
        assert!(matches!(err, LoadError::Artifact { .. }));
    }

    #[test]
    fn test_loads_exported_pipeline_artifact() {
        let bytes = super::super::graph::fixtures::price_model_bytes();
        let artifact = write_temp(&bytes);
        let metadata = write_temp(br#"{"brands": ["BMW", "Toyota"], "fuel_types": ["Diesel", "Gasoline"], "r2_score": 0.9}"#);
        let paths = ModelPaths::new(artifact.path(), metadata.path());

        let resource = ModelResource::load(&paths);
        let model = resource.available().expect("exported pipeline should load");
        let features = CarFeatures {
            brand: "Toyota".to_string(),
            mileage: 30000.0,
            year: 2020,
            fuel_type: "Gasoline".to_string(),
        };

        assert_eq!(model.predict(&features).unwrap(), 23500.0);
        assert_eq!(model.checksum().map(str::len), Some(64));
        assert_eq!(model.inference_stats().total_inferences, 1);
    }

    #[test]
    fn test_load_metadata_document() {
        let file = write_temp(br#"{"brands": ["Audi", "BMW"], "fuel_types": ["Electric"], "r2_score": 0.87}"#);
        let metadata = load_metadata(file.path()).unwrap();

        assert_eq!(metadata.known_brands.len(), 2);
        assert!(metadata.is_known_brand("BMW"));
        assert_eq!(metadata.r2_score, 0.87);
    }

    #[test]
    fn test_malformed_metadata_rejected() {
        let file = write_temp(b"{ brands: oops");
        let err = load_metadata(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Metadata { .. }));
    }

    #[test]
    fn test_with_predictor_is_available() {
        let resource = ModelResource::with_predictor(FixedPredictor(42.0), ModelMetadata::default());
        let model = resource.available().unwrap();
        let features = CarFeatures {
            brand: "Ford".to_string(),
            mileage: 10.0,
            year: 2015,
            fuel_type: "Diesel".to_string(),
        };

        assert_eq!(model.predict(&features).unwrap(), 42.0);
        assert!(model.checksum().is_none());
        assert_eq!(model.inference_stats(), InferenceStats::default());
    }
}
