//! Eco-Price server - used-car price estimates over HTTP
//!
//! Loads the trained model once at startup and serves predictions,
//! monitoring and health endpoints. A failed model load keeps the
//! server up in a degraded state that answers 503.

use anyhow::Result;
use eco_price_server::{api, ServerConfig};
use estimator_lib::{EstimatorService, ModelResource, StructuredLogger, MODEL_VERSION};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_NAME: &str = "eco-price";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting eco-price server");

    let config = ServerConfig::load()?;
    let paths = config.model_paths();
    info!(
        model_path = ?paths.model_path,
        metadata_path = ?paths.metadata_path,
        "Server configured"
    );

    let logger = StructuredLogger::new(SERVICE_NAME);

    // Fail soft: an unavailable model still lets the server report its own health
    let resource = ModelResource::load(&paths);
    match &resource {
        ModelResource::Loaded(model) => logger.log_model_loaded(
            model.checksum(),
            model.metadata().r2_score,
            model.metadata().known_brands.len(),
        ),
        ModelResource::Unavailable { reason } => logger.log_model_load_failed(reason),
    }

    let service = EstimatorService::new(resource, logger.clone());
    let app_state = Arc::new(api::AppState::new(service, config.frontend_path()));

    logger.log_startup(SERVICE_VERSION, MODEL_VERSION);

    let shutdown_logger = logger.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    };

    api::serve(&config.bind_addr(), app_state.clone(), shutdown).await?;

    if let Some(model) = app_state.service.resource().available() {
        let stats = model.inference_stats();
        logger.log_inference_stats(stats.total_inferences, stats.slow_inferences);
    }
    info!("Shut down");

    Ok(())
}
