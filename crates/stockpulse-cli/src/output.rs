//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde_json::{json, Value};

use stockpulse_core::{
    ConnectionStatus, InventorySnapshot, Notification, ProgressEvent, Severity, StockLevel,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output, one document per line
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print an inventory table with its summary
    pub fn print_inventory(&self, snapshot: &InventorySnapshot) {
        match self.format {
            OutputFormat::Human => {
                if snapshot.is_empty() {
                    println!("Inventory is empty.");
                    return;
                }
                println!("{:<12} {:>10}  {}", "PRODUCT", "QUANTITY", "LEVEL");
                for (id, quantity) in snapshot.iter() {
                    println!(
                        "{:<12} {:>10}  {}",
                        id.as_str(),
                        quantity,
                        StockLevel::for_quantity(quantity).label()
                    );
                }
                let summary = snapshot.summary();
                println!(
                    "\n{} product(s), {} unit(s), {} low, {} out of stock",
                    summary.total_products,
                    summary.total_quantity,
                    summary.low_stock,
                    summary.out_of_stock
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({
                        "inventory": snapshot.to_rows(),
                        "summary": snapshot.summary(),
                    })
                );
            }
            OutputFormat::Quiet => {
                for (id, quantity) in snapshot.iter() {
                    println!("{}\t{}", id, quantity);
                }
            }
        }
    }

    /// Print a live notification
    pub fn print_notification(&self, notification: &Notification) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "[{}] {} {}",
                    notification.issued_at.format("%H:%M:%S"),
                    severity_marker(notification.severity),
                    notification.message
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({
                        "type": "notification",
                        "severity": notification.severity,
                        "message": notification.message,
                        "issued_at": notification.issued_at.to_rfc3339(),
                    })
                );
            }
            OutputFormat::Quiet => {
                if notification.severity == Severity::Error {
                    eprintln!("{}", notification.message);
                }
            }
        }
    }

    /// Print a connection status change
    pub fn print_status(&self, status: ConnectionStatus) {
        match self.format {
            OutputFormat::Human => println!("── {} ──", status_label(status)),
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({ "type": "status", "status": status_label(status) })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print one retraining progress event
    pub fn print_progress(&self, event: &ProgressEvent) {
        match (self.format, event) {
            (OutputFormat::Json, ProgressEvent::Progress { message })
            | (OutputFormat::Json, ProgressEvent::Error { message }) => {
                println!("{}", json!({ "status": event.kind(), "message": message }));
            }
            (OutputFormat::Json, ProgressEvent::Complete { result }) => {
                println!("{}", result);
            }
            (OutputFormat::Human, ProgressEvent::Progress { message }) => {
                println!("  … {}", message);
            }
            (OutputFormat::Human, ProgressEvent::Complete { result }) => {
                let message = result
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Retraining complete");
                println!("✓ {}", message);
            }
            // Failures are reported by the caller
            (OutputFormat::Human, ProgressEvent::Error { .. }) => {}
            (OutputFormat::Quiet, _) => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

pub fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Open => "open",
        ConnectionStatus::Reconnecting => "reconnecting",
        ConnectionStatus::Closed => "closed",
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "✓",
        Severity::Warning => "!",
        Severity::Error => "✗",
        Severity::Info => "·",
    }
}
