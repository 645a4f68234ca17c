//! Price prediction command

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, PredictRequest};
use crate::output::{
    color_confidence, format_mileage, format_price, print_json, print_warning, OutputFormat,
};

/// Confidence the server reports for requests outside the training distribution
const OUTLIER_CONFIDENCE: f64 = 0.5;

/// Request a price estimate for one car
pub async fn predict_price(
    client: &ApiClient,
    request: PredictRequest,
    format: OutputFormat,
) -> Result<()> {
    let prediction = client.predict(&request).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            println!("{}", "Price Estimate".bold());
            println!("{}", "=".repeat(40));
            println!(
                "Car:        {} {} ({}, {})",
                request.year,
                request.brand.cyan(),
                request.fuel_type,
                format_mileage(request.mileage)
            );
            println!("Price:      {}", format_price(prediction.predicted_price).green().bold());
            println!("Confidence: {}", color_confidence(prediction.confidence_score));
            println!("Model:      {}", prediction.model_version);

            if prediction.confidence_score <= OUTLIER_CONFIDENCE {
                println!();
                print_warning("Input is outside the training distribution; treat this estimate with care");
            }
        }
    }

    Ok(())
}
