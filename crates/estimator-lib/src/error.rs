//! Error taxonomy for the serving pipeline

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single rejected request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every field that failed validation for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Failure of a single prediction request
#[derive(Debug, Error)]
pub enum PredictError {
    /// Model resource failed to load at startup
    #[error("model resource unavailable")]
    Unavailable,

    #[error("invalid request: {0}")]
    Validation(ValidationErrors),

    /// The inference backend raised while running the artifact
    #[error("model invocation failed: {0}")]
    Invocation(#[source] anyhow::Error),
}

/// Failure while loading the model artifact or its metadata document
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed metadata document {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed model artifact {path:?}: {source:#}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_display_lists_every_field() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.push("brand", "must be at least 2 characters");
        errors.push("year", "must be between 1900 and 2026");

        let text = errors.to_string();
        assert!(text.contains("brand"));
        assert!(text.contains("year"));
        assert_eq!(errors.fields(), vec!["brand", "year"]);
        assert_eq!(
            errors.violations()[1],
            FieldViolation::new("year", "must be between 1900 and 2026")
        );
    }

    #[test]
    fn test_validation_errors_serialize_as_list() {
        let errors = ValidationErrors::single("mileage", "must be >= 0");
        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(value[0]["field"], "mileage");
        assert_eq!(value[0]["message"], "must be >= 0");
    }
}
