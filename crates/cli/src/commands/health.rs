//! Service health command

use anyhow::Result;
use colored::Colorize;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_success, OutputFormat};

/// Show server health and model quality
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(40));
            println!("Status:       {}", color_status(&health.status));
            println!("Model loaded: {}", health.model_loaded);
            println!("R² score:     {:.4}", health.r2_score);
            println!();
            print_success("Model is serving predictions");
        }
    }

    Ok(())
}
