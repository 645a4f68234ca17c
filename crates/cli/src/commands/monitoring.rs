//! Monitoring window command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_outlier, format_mileage, format_price, print_info, print_json, print_warning,
    OutputFormat,
};

/// Row for recent predictions table
#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Brand")]
    brand: String,
    #[tabled(rename = "Year")]
    year: i64,
    #[tabled(rename = "Mileage")]
    mileage: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Outlier")]
    outlier: String,
}

/// Show aggregate statistics and recent predictions
pub async fn show_monitoring(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let monitoring = client.monitoring().await?;

    match format {
        OutputFormat::Json => print_json(&monitoring)?,
        OutputFormat::Table => {
            println!("{}", "Monitoring Window".bold());
            println!("{}", "=".repeat(60));
            println!("Requests: {}", monitoring.total_requests);
            println!("Outliers: {}", monitoring.outlier_count);
            if monitoring.drift_detected {
                println!("Drift:    {}", "DETECTED".red().bold());
            } else {
                println!("Drift:    {}", "none".green());
            }
            println!();

            if monitoring.logs.is_empty() {
                print_info("No predictions served yet");
                return Ok(());
            }

            let rows: Vec<LogRow> = monitoring
                .logs
                .iter()
                .map(|entry| LogRow {
                    timestamp: format_timestamp(&entry.timestamp),
                    brand: entry.request.brand.clone(),
                    year: entry.request.year,
                    mileage: format_mileage(entry.request.mileage),
                    price: format_price(entry.price),
                    outlier: color_outlier(entry.is_outlier),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            if monitoring.drift_detected {
                print_warning("Outlier rate exceeds 20% of the window; inputs may have drifted");
            }
        }
    }

    Ok(())
}

/// Trim an ISO-8601 timestamp to second precision for display
fn format_timestamp(timestamp: &str) -> String {
    match timestamp.split_once('.') {
        Some((seconds, _)) => seconds.replace('T', " "),
        None => timestamp.trim_end_matches('Z').replace('T', " "),
    }
}
