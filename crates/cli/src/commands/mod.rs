//! CLI subcommand implementations

pub mod health;
pub mod monitoring;
pub mod predict;
