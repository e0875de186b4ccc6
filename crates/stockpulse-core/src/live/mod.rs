//! Live inventory sync over the push channel
//!
//! Keeps a local copy of the server's inventory in step with the
//! "inventory room" on the push server.
//!
//! ## Protocol
//!
//! 1. Open the transport (WebSocket)
//! 2. Send `join_<topic>_room`; repeated after every reconnect
//! 3. Receive `initial_inventory`, the canonical full snapshot
//! 4. Receive `inventory_update` frames, each carrying the full new snapshot
//!
//! Updates that arrive before the snapshot on a connection are held back and
//! never applied over it.
//!
//! ## Usage
//!
//! ```ignore
//! let mut client = LiveSyncClient::new(config.live_sync_config());
//! let mut events = client.take_events().unwrap();
//! client.connect("inventory")?;
//! ```

mod client;
mod message;
mod reconnect;
mod state;
mod transport;

pub use client::{Connection, ConnectionStatus, LiveEvent, LiveSyncClient, LiveSyncConfig};
pub use message::{ClientMessage, ServerMessage, UpdateFrame};
pub use reconnect::ReconnectPolicy;
pub use state::{Applied, SyncState};
pub use transport::{Connector, FrameSink, FrameStream, PushChannel, WsConnector};
