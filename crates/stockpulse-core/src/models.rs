//! Data models for StockPulse
//!
//! Defines the inventory state shared with the stock service: product
//! identifiers, the authoritative snapshot, change deltas, and the advisory
//! notifications derived from them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Quantity below which a product counts as low stock
pub const LOW_STOCK_THRESHOLD: u64 = 100;

/// Quantity below which a product counts as medium stock
pub const MEDIUM_STOCK_THRESHOLD: u64 = 300;

/// Product identifier, trimmed and uppercased
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Normalize and validate a raw identifier
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(FrameError::InvalidField {
                field: "ProductID",
                details: "product id is empty".to_string(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProductId {
    type Error = FrameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inventory row as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    #[serde(rename = "ProductID")]
    pub product_id: String,
    #[serde(rename = "Quantity")]
    pub quantity: serde_json::Number,
}

impl InventoryRow {
    pub fn new(product_id: impl Into<String>, quantity: u64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity: quantity.into(),
        }
    }

    /// Validated quantity: a non-negative whole number
    ///
    /// Whole floats (`50.0`) are accepted since the stock service serializes
    /// dataframe columns that may have been promoted to float.
    fn validated_quantity(&self) -> Result<u64, FrameError> {
        if let Some(q) = self.quantity.as_u64() {
            return Ok(q);
        }
        match self.quantity.as_f64() {
            Some(q) if q >= 0.0 && q.fract() == 0.0 && q <= u64::MAX as f64 => Ok(q as u64),
            _ => Err(FrameError::InvalidField {
                field: "Quantity",
                details: format!(
                    "{} for product '{}' is not a non-negative integer",
                    self.quantity, self.product_id
                ),
            }),
        }
    }
}

/// Stock level classification for a single quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    Low,
    Medium,
    InStock,
}

impl StockLevel {
    pub fn for_quantity(quantity: u64) -> Self {
        match quantity {
            0 => StockLevel::OutOfStock,
            q if q < LOW_STOCK_THRESHOLD => StockLevel::Low,
            q if q < MEDIUM_STOCK_THRESHOLD => StockLevel::Medium,
            _ => StockLevel::InStock,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StockLevel::OutOfStock => "Out of Stock",
            StockLevel::Low => "Low Stock",
            StockLevel::Medium => "Medium",
            StockLevel::InStock => "In Stock",
        }
    }
}

/// Aggregate figures over a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub total_products: usize,
    pub total_quantity: u64,
    pub low_stock: usize,
    pub out_of_stock: usize,
}

/// Complete product → quantity mapping held by the server
///
/// Never patched: every snapshot or update frame produces a new value that
/// replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventorySnapshot {
    items: BTreeMap<ProductId, u64>,
}

impl InventorySnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from wire rows, validating every row
    ///
    /// A repeated product id keeps the last row's quantity.
    pub fn from_rows(rows: &[InventoryRow]) -> Result<Self, FrameError> {
        let mut items = BTreeMap::new();
        for row in rows {
            let id = ProductId::parse(&row.product_id)?;
            let quantity = row.validated_quantity()?;
            if items.insert(id.clone(), quantity).is_some() {
                tracing::debug!("Duplicate inventory row for {}, keeping last", id);
            }
        }
        Ok(Self { items })
    }

    /// Convert back to wire rows (ordered by product id)
    pub fn to_rows(&self) -> Vec<InventoryRow> {
        self.items
            .iter()
            .map(|(id, qty)| InventoryRow::new(id.as_str(), *qty))
            .collect()
    }

    /// Quantity for a product (identifier is normalized first)
    pub fn quantity(&self, product_id: &str) -> Option<u64> {
        let id = ProductId::parse(product_id).ok()?;
        self.items.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, u64)> {
        self.items.iter().map(|(id, qty)| (id, *qty))
    }

    /// Products whose quantity differs between `self` and `newer`,
    /// including products present in only one of them
    pub fn changed_products(&self, newer: &InventorySnapshot) -> Vec<ProductId> {
        let mut changed = BTreeSet::new();
        for (id, qty) in &newer.items {
            if self.items.get(id) != Some(qty) {
                changed.insert(id.clone());
            }
        }
        for id in self.items.keys() {
            if !newer.items.contains_key(id) {
                changed.insert(id.clone());
            }
        }
        changed.into_iter().collect()
    }

    /// Totals shown on the dashboard header
    pub fn summary(&self) -> InventorySummary {
        let mut summary = InventorySummary {
            total_products: self.items.len(),
            ..Default::default()
        };
        for qty in self.items.values() {
            summary.total_quantity = summary.total_quantity.saturating_add(*qty);
            match StockLevel::for_quantity(*qty) {
                StockLevel::OutOfStock => summary.out_of_stock += 1,
                StockLevel::Low => summary.low_stock += 1,
                _ => {}
            }
        }
        summary
    }
}

/// Classification of a stock change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockAction {
    Add,
    Sell,
    /// Any label the server sends that is not recognized
    Unknown(String),
}

impl StockAction {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "add" => StockAction::Add,
            "sell" => StockAction::Sell,
            _ => StockAction::Unknown(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StockAction::Add => "add",
            StockAction::Sell => "sell",
            StockAction::Unknown(label) => label,
        }
    }
}

impl fmt::Display for StockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed in one inventory update
#[derive(Debug, Clone)]
pub struct InventoryDelta {
    /// Products touched by the change
    pub affected: Vec<ProductId>,
    /// The full inventory after the change
    pub snapshot: Arc<InventorySnapshot>,
    /// Human-readable description from the server
    pub message: String,
    pub action: StockAction,
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl Severity {
    /// Severity shown for a stock action
    pub fn for_action(action: &StockAction) -> Self {
        match action {
            StockAction::Add => Severity::Success,
            StockAction::Sell => Severity::Warning,
            StockAction::Unknown(_) => Severity::Info,
        }
    }
}

/// Advisory message for display, visible for a fixed lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub lifetime: Duration,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            severity,
            message: message.into(),
            issued_at: Utc::now(),
            lifetime,
        }
    }

    /// Notification describing an inventory change
    pub fn for_delta(delta: &InventoryDelta, lifetime: Duration) -> Self {
        Self::new(
            Severity::for_action(&delta.action),
            delta.message.clone(),
            lifetime,
        )
    }

    /// Whether the notification should no longer be shown at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.issued_at)
            .to_std()
            .map(|age| age >= self.lifetime)
            .unwrap_or(false)
    }
}
