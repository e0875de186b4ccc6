//! Stock command handlers

use anyhow::{anyhow, Result};

use stockpulse_core::{ApiError, Config, InventoryApi, StockAction, StockChange, StockLevel};

use crate::output::{Output, OutputFormat};

fn api(config: &Config) -> Result<InventoryApi> {
    InventoryApi::new(config.api_config()).map_err(with_hint)
}

/// Attach the recovery hint, if any, to an API error
fn with_hint(err: ApiError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow!("{}\n  {}", err, hint),
        None => err.into(),
    }
}

fn report_change(change: &StockChange, output: &Output) {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "status": "success",
                    "product_id": change.product_id,
                    "message": change.message,
                    "new_quantity": change.new_quantity,
                    "summary": change.snapshot.summary(),
                })
            );
        }
        OutputFormat::Quiet => {
            if let Some(quantity) = change.new_quantity {
                println!("{}", quantity);
            }
        }
        OutputFormat::Human => output.success(&change.message),
    }
}

/// Add units to a product
pub async fn add(config: &Config, product_id: &str, quantity: u64, output: &Output) -> Result<()> {
    let change = api(config)?
        .update_stock(product_id, quantity, &StockAction::Add)
        .await
        .map_err(with_hint)?;
    report_change(&change, output);
    Ok(())
}

/// Sell units of a product
pub async fn sell(config: &Config, product_id: &str, quantity: u64, output: &Output) -> Result<()> {
    let change = api(config)?
        .update_stock(product_id, quantity, &StockAction::Sell)
        .await
        .map_err(with_hint)?;
    report_change(&change, output);
    Ok(())
}

/// Create a product
pub async fn create(
    config: &Config,
    product_id: &str,
    initial_quantity: u64,
    output: &Output,
) -> Result<()> {
    let change = api(config)?
        .add_product(product_id, initial_quantity)
        .await
        .map_err(with_hint)?;
    report_change(&change, output);
    Ok(())
}

pub async fn remove(config: &Config, product_id: &str, output: &Output) -> Result<()> {
    let change = api(config)?
        .remove_product(product_id)
        .await
        .map_err(with_hint)?;
    report_change(&change, output);
    Ok(())
}

pub async fn list(config: &Config, output: &Output) -> Result<()> {
    let snapshot = api(config)?.inventory().await.map_err(with_hint)?;
    output.print_inventory(&snapshot);
    Ok(())
}

pub async fn show(config: &Config, product_id: &str, output: &Output) -> Result<()> {
    let quantity = api(config)?
        .product_quantity(product_id)
        .await
        .map_err(with_hint)?;
    let level = StockLevel::for_quantity(quantity);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "product_id": product_id.trim().to_uppercase(),
                    "quantity": quantity,
                    "level": level,
                })
            );
        }
        OutputFormat::Quiet => println!("{}", quantity),
        OutputFormat::Human => {
            println!("Product:  {}", product_id.trim().to_uppercase());
            println!("Quantity: {}", quantity);
            println!("Level:    {}", level.label());
        }
    }
    Ok(())
}
