//! HTTP front end for the price estimator

pub mod api;
pub mod config;

pub use api::{create_router, serve, ApiError, AppState};
pub use crate::config::ServerConfig;
