//! Stock REST client
//!
//! Request/response calls against the stock service. Successful mutations
//! are broadcast by the server as `inventory_update` frames, so a running
//! [`crate::live::LiveSyncClient`] sees them without polling.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, FrameError};
use crate::models::{InventoryRow, InventorySnapshot, ProductId, StockAction};

/// Stock service endpoint settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Limit for a whole request
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Reply of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: Option<String>,
}

/// Result of a successful stock mutation
#[derive(Debug, Clone)]
pub struct StockChange {
    pub product_id: ProductId,
    pub message: String,
    pub new_quantity: Option<u64>,
    /// Inventory after the change
    pub snapshot: InventorySnapshot,
}

/// Union of the fields the stock service replies with
#[derive(Debug, Default, Deserialize)]
struct Reply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    inventory: Option<Vec<InventoryRow>>,
    #[serde(default)]
    quantity: Option<u64>,
    #[serde(default)]
    new_quantity: Option<u64>,
}

#[derive(Serialize)]
struct UpdateStockBody<'a> {
    product_id: &'a str,
    quantity: u64,
    action: &'a str,
}

#[derive(Serialize)]
struct AddProductBody<'a> {
    product_id: &'a str,
    initial_quantity: u64,
}

/// Client for the stock service
pub struct InventoryApi {
    client: reqwest::Client,
    base_url: Url,
}

impl InventoryApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ApiError::InvalidInput(format!("Invalid api_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidInput(format!(
                "api_url '{}' cannot be used as a base URL",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stockpulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let reply = self.send(self.client.get(self.endpoint(&["health"]))).await?;
        Ok(HealthStatus {
            status: reply.status.unwrap_or_else(|| "unknown".to_string()),
            service: reply.service,
        })
    }

    /// Full inventory
    pub async fn inventory(&self) -> Result<InventorySnapshot, ApiError> {
        let reply = self
            .send(self.client.get(self.endpoint(&["api", "inventory"])))
            .await?;
        snapshot_from(reply.inventory)
    }

    /// Quantity of one product
    pub async fn product_quantity(&self, product_id: &str) -> Result<u64, ApiError> {
        let product_id = parse_product_id(product_id)?;
        let reply = self
            .send(
                self.client
                    .get(self.endpoint(&["api", "inventory", product_id.as_str()])),
            )
            .await?;
        reply
            .quantity
            .ok_or(ApiError::InvalidInventory(FrameError::MissingField("quantity")))
    }

    /// Add or sell stock of an existing product
    pub async fn update_stock(
        &self,
        product_id: &str,
        quantity: u64,
        action: &StockAction,
    ) -> Result<StockChange, ApiError> {
        let product_id = parse_product_id(product_id)?;
        if quantity == 0 {
            return Err(ApiError::InvalidInput(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        if let StockAction::Unknown(label) = action {
            return Err(ApiError::InvalidInput(format!(
                "Invalid action '{}'. Use 'add' or 'sell'",
                label
            )));
        }

        info!("{} {} x{}", action, product_id, quantity);
        let body = UpdateStockBody {
            product_id: product_id.as_str(),
            quantity,
            action: action.as_str(),
        };
        let reply = self
            .send(
                self.client
                    .post(self.endpoint(&["api", "update_stock"]))
                    .json(&body),
            )
            .await?;
        change_from(product_id, reply)
    }

    /// Create a product (or top up an existing one)
    pub async fn add_product(
        &self,
        product_id: &str,
        initial_quantity: u64,
    ) -> Result<StockChange, ApiError> {
        let product_id = parse_product_id(product_id)?;

        info!("Adding product {} with {} units", product_id, initial_quantity);
        let body = AddProductBody {
            product_id: product_id.as_str(),
            initial_quantity,
        };
        let reply = self
            .send(
                self.client
                    .post(self.endpoint(&["api", "add_product"]))
                    .json(&body),
            )
            .await?;
        change_from(product_id, reply)
    }

    pub async fn remove_product(&self, product_id: &str) -> Result<StockChange, ApiError> {
        let product_id = parse_product_id(product_id)?;

        info!("Removing product {}", product_id);
        let reply = self
            .send(
                self.client
                    .delete(self.endpoint(&["api", "remove_product", product_id.as_str()])),
            )
            .await?;
        change_from(product_id, reply)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Reply, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} {}", status, response.url());

        let reply: Reply = match response.json().await {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => Reply::default(),
            Err(e) => return Err(e.into()),
        };

        if !status.is_success() || reply.success == Some(false) {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: reply.message.unwrap_or_else(|| default_message(status)),
            });
        }
        Ok(reply)
    }
}

fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    ProductId::parse(raw).map_err(|e| ApiError::InvalidInput(e.to_string()))
}

fn snapshot_from(rows: Option<Vec<InventoryRow>>) -> Result<InventorySnapshot, ApiError> {
    let rows = rows.ok_or(FrameError::MissingField("inventory"))?;
    Ok(InventorySnapshot::from_rows(&rows)?)
}

fn change_from(product_id: ProductId, reply: Reply) -> Result<StockChange, ApiError> {
    let snapshot = snapshot_from(reply.inventory)?;
    Ok(StockChange {
        message: reply
            .message
            .unwrap_or_else(|| format!("Updated {}", product_id)),
        new_quantity: reply.new_quantity,
        product_id,
        snapshot,
    })
}

fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
