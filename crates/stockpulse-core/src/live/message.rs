//! Push channel message types
//!
//! Every frame is a JSON text envelope `{"event": <name>, "data": <object>}`.
//! Outbound messages are built from [`ClientMessage`]; inbound frames are
//! decoded into [`ServerMessage`] with field validation at the boundary.
//! Unknown events and extra fields are tolerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;
use crate::models::{InventoryRow, InventorySnapshot, ProductId, StockAction};

/// Wire envelope shared by both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

/// Messages sent to the push server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Join the topic room; re-sent after every reconnect
    Join { topic: String, client_id: String },
    /// Leave the topic room
    Leave { topic: String },
    /// Ask the server to re-send the current inventory
    RequestInventory { timestamp: DateTime<Utc> },
}

impl ClientMessage {
    /// Create a join message
    pub fn join(topic: &str, client_id: &str) -> Self {
        ClientMessage::Join {
            topic: topic.to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Create a leave message
    pub fn leave(topic: &str) -> Self {
        ClientMessage::Leave {
            topic: topic.to_string(),
        }
    }

    /// Event name on the wire
    pub fn event_name(&self) -> String {
        match self {
            ClientMessage::Join { topic, .. } => format!("join_{}_room", topic),
            ClientMessage::Leave { topic } => format!("leave_{}_room", topic),
            ClientMessage::RequestInventory { .. } => "request_inventory".to_string(),
        }
    }

    /// Encode message to a JSON text frame
    pub fn encode(&self) -> String {
        let data = match self {
            ClientMessage::Join { topic, client_id } => {
                serde_json::json!({ "room": topic, "client_id": client_id })
            }
            ClientMessage::Leave { topic } => serde_json::json!({ "room": topic }),
            ClientMessage::RequestInventory { timestamp } => {
                serde_json::json!({ "timestamp": timestamp.to_rfc3339() })
            }
        };
        let envelope = Envelope {
            event: self.event_name(),
            data,
        };
        // An envelope of strings and JSON values always serializes
        serde_json::to_string(&envelope).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionResponseData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomData {
    #[serde(default)]
    room: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotData {
    inventory: Option<Vec<InventoryRow>>,
}

#[derive(Debug, Deserialize)]
struct UpdateData {
    inventory: Option<Vec<InventoryRow>>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
}

/// Full inventory change pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFrame {
    pub inventory: InventorySnapshot,
    pub message: String,
    pub action: StockAction,
    /// Product the server says was touched, when it names one
    pub product_id: Option<ProductId>,
}

/// Messages received from the push server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Transport-level greeting carrying the session identity
    ConnectionResponse {
        status: Option<String>,
        sid: Option<String>,
    },
    /// Join acknowledgement
    Joined { room: Option<String> },
    /// Leave acknowledgement
    Left { room: Option<String> },
    /// `initial_inventory`: canonical full state
    Snapshot(InventorySnapshot),
    /// `inventory_update`: full state plus change metadata
    Update(UpdateFrame),
    /// Any other event name
    Unknown(String),
}

impl ServerMessage {
    /// Decode message from a JSON text frame
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_str(text)?;

        match envelope.event.as_str() {
            "connection_response" => {
                let data: ConnectionResponseData = from_data(envelope.data)?;
                Ok(ServerMessage::ConnectionResponse {
                    status: data.status,
                    sid: data.sid,
                })
            }
            "joined_room" => {
                let data: RoomData = from_data(envelope.data)?;
                Ok(ServerMessage::Joined { room: data.room })
            }
            "left_room" => {
                let data: RoomData = from_data(envelope.data)?;
                Ok(ServerMessage::Left { room: data.room })
            }
            "initial_inventory" => {
                let data: SnapshotData = from_data(envelope.data)?;
                let rows = data.inventory.ok_or(FrameError::MissingField("inventory"))?;
                Ok(ServerMessage::Snapshot(InventorySnapshot::from_rows(&rows)?))
            }
            "inventory_update" => {
                let data: UpdateData = from_data(envelope.data)?;
                let rows = data.inventory.ok_or(FrameError::MissingField("inventory"))?;
                let product_id = match data.product_id.as_deref() {
                    Some(raw) => Some(ProductId::parse(raw)?),
                    None => None,
                };
                Ok(ServerMessage::Update(UpdateFrame {
                    inventory: InventorySnapshot::from_rows(&rows)?,
                    message: data.message.unwrap_or_else(|| "Inventory updated".to_string()),
                    action: StockAction::from_label(data.action.as_deref().unwrap_or("")),
                    product_id,
                }))
            }
            other => Ok(ServerMessage::Unknown(other.to_string())),
        }
    }
}

/// Decode an event's `data`, treating an absent payload as an empty object
fn from_data<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, FrameError> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    Ok(serde_json::from_value(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_message_encoding() {
        let text = ClientMessage::join("inventory", "stockpulse-1234").encode();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["event"], "join_inventory_room");
        assert_eq!(value["data"]["room"], "inventory");
        assert_eq!(value["data"]["client_id"], "stockpulse-1234");
    }

    #[test]
    fn test_request_inventory_encoding() {
        let text = ClientMessage::RequestInventory {
            timestamp: Utc::now(),
        }
        .encode();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "request_inventory");
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn test_decode_initial_inventory() {
        let text = r#"{"event":"initial_inventory","data":{"inventory":[{"ProductID":"p001","Quantity":50}]}}"#;
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::Snapshot(snapshot) => {
                assert_eq!(snapshot.quantity("P001"), Some(50));
            }
            other => panic!("Expected Snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_update_ignores_extra_fields() {
        let text = r#"{"event":"inventory_update","data":{
            "product_id":"P001","action":"sell","quantity":10,"new_quantity":40,
            "message":"Sold 10 units of P001","extra":{"nested":true},
            "inventory":[{"ProductID":"P001","Quantity":40}]}}"#;
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::Update(update) => {
                assert_eq!(update.action, StockAction::Sell);
                assert_eq!(update.message, "Sold 10 units of P001");
                assert_eq!(update.product_id.unwrap().as_str(), "P001");
                assert_eq!(update.inventory.quantity("P001"), Some(40));
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_update_requires_inventory() {
        let text = r#"{"event":"inventory_update","data":{"message":"hi","action":"add"}}"#;
        let err = ServerMessage::decode(text).unwrap_err();
        assert!(matches!(err, FrameError::MissingField("inventory")));
    }

    #[test]
    fn test_decode_connection_response_and_unknown() {
        let text = r#"{"event":"connection_response","data":{"status":"connected","sid":"abc"}}"#;
        assert_eq!(
            ServerMessage::decode(text).unwrap(),
            ServerMessage::ConnectionResponse {
                status: Some("connected".to_string()),
                sid: Some("abc".to_string()),
            }
        );

        let text = r#"{"event":"inventory_request"}"#;
        assert_eq!(
            ServerMessage::decode(text).unwrap(),
            ServerMessage::Unknown("inventory_request".to_string())
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(ServerMessage::decode("not json").is_err());
        assert!(ServerMessage::decode(r#"{"data":{}}"#).is_err());
    }
}
