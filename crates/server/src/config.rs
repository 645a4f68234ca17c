//! Server configuration

use anyhow::{Context, Result};
use estimator_lib::ModelPaths;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration, resolved once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Installation root that relative default paths hang off
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Model artifact location (default: `<base_dir>/model/model.onnx`)
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Metadata document location (default: `<base_dir>/model/metadata.json`)
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,

    /// Landing page location (default: `<base_dir>/frontend/index.html`)
    #[serde(default)]
    pub frontend_path: Option<PathBuf>,

    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            model_path: None,
            metadata_path: None,
            frontend_path: None,
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment (`MODEL_PATH`, `METADATA_PATH`, `PORT`, ...)
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid server configuration")
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::new(
            self.model_path
                .clone()
                .unwrap_or_else(|| self.base_dir.join("model").join("model.onnx")),
            self.metadata_path
                .clone()
                .unwrap_or_else(|| self.base_dir.join("model").join("metadata.json")),
        )
    }

    pub fn frontend_path(&self) -> PathBuf {
        self.frontend_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("frontend").join("index.html"))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn build(overrides: &[(&str, &str)]) -> ServerConfig {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        ServerConfig::from_config(builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = build(&[]);
        let paths = config.model_paths();

        assert_eq!(config.port, 8000);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(paths.model_path, Path::new("./model/model.onnx"));
        assert_eq!(paths.metadata_path, Path::new("./model/metadata.json"));
        assert_eq!(config.frontend_path(), Path::new("./frontend/index.html"));
    }

    #[test]
    fn test_explicit_paths_override_base_dir() {
        let config = build(&[
            ("base_dir", "/opt/eco-price"),
            ("model_path", "/models/v2.onnx"),
            ("port", "9090"),
        ]);
        let paths = config.model_paths();

        assert_eq!(config.port, 9090);
        assert_eq!(paths.model_path, Path::new("/models/v2.onnx"));
        assert_eq!(paths.metadata_path, Path::new("/opt/eco-price/model/metadata.json"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let config = config::Config::builder()
            .set_override("port", "not-a-port")
            .unwrap()
            .build()
            .unwrap();
        assert!(ServerConfig::from_config(config).is_err());
    }
}
