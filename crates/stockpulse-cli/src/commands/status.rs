//! Status command handler

use anyhow::Result;

use stockpulse_core::{Config, InventoryApi};

use crate::output::{Output, OutputFormat};

/// Show service health, inventory summary and endpoints
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    let api = InventoryApi::new(config.api_config())?;

    // An unreachable service is reported, not treated as a failure
    let health = api.health().await.map_err(|e| e.to_string());
    let summary = match health {
        Ok(_) => api
            .inventory()
            .await
            .map(|snapshot| snapshot.summary())
            .map_err(|e| e.to_string()),
        Err(ref e) => Err(e.clone()),
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "api_url": config.api_url,
                    "push_url": config.push_url,
                    "forecast_url": config.forecast_url,
                    "topic": config.topic,
                    "health": health.as_ref().ok(),
                    "error": health.as_ref().err(),
                    "summary": summary.as_ref().ok(),
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if health.is_ok() { "up" } else { "down" });
        }
        OutputFormat::Human => {
            println!("StockPulse Status");
            println!("=================");
            println!();
            println!("Stock service:");
            println!("  URL:    {}", config.api_url);
            match &health {
                Ok(health) => println!("  Health: {}", health.status),
                Err(e) => println!("  Health: unreachable ({})", e),
            }
            println!();
            println!("Live updates:");
            println!("  URL:   {}", config.push_url);
            println!("  Topic: {}", config.topic);
            println!();
            println!("Forecast service:");
            println!("  URL: {}", config.forecast_url);

            if let Ok(summary) = &summary {
                println!();
                println!("Inventory:");
                println!("  Products:     {}", summary.total_products);
                println!("  Units:        {}", summary.total_quantity);
                println!("  Low stock:    {}", summary.low_stock);
                println!("  Out of stock: {}", summary.out_of_stock);
            }
        }
    }

    Ok(())
}
