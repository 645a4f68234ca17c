//! Eco-Price CLI
//!
//! A command-line tool for requesting price estimates and inspecting
//! the health and monitoring window of a running Eco-Price server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, monitoring, predict};

/// Eco-Price Estimator CLI
#[derive(Parser)]
#[command(name = "ecp")]
#[command(author, version, about = "CLI for the Eco-Price Estimator", long_about = None)]
pub struct Cli {
    /// Server URL (can also be set via ECP_API_URL env var)
    #[arg(long, env = "ECP_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check server health and model quality
    Health,

    /// Estimate the price of a car
    Predict {
        /// Car brand (normalized to title case by the server)
        #[arg(long)]
        brand: String,

        /// Mileage driven
        #[arg(long)]
        mileage: f64,

        /// Model year
        #[arg(long)]
        year: i64,

        /// Fuel type (e.g. Gasoline, Diesel, Electric, Hybrid)
        #[arg(long)]
        fuel_type: String,
    },

    /// Show recent predictions, outlier count and drift status
    Monitoring,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Health => health::show_health(&client, cli.format).await?,
        Commands::Predict {
            brand,
            mileage,
            year,
            fuel_type,
        } => {
            let request = client::PredictRequest {
                brand,
                mileage,
                year,
                fuel_type,
            };
            predict::predict_price(&client, request, cli.format).await?;
        }
        Commands::Monitoring => monitoring::show_monitoring(&client, cli.format).await?,
    }

    Ok(())
}
