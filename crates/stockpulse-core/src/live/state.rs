//! Inventory sync state
//!
//! Reduces decoded server messages into the local inventory copy. Holds the
//! per-connection readiness gate: until the canonical snapshot arrives on a
//! connection, update frames are buffered instead of applied.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::message::{ServerMessage, UpdateFrame};
use crate::models::{InventoryDelta, InventorySnapshot};

/// Result of applying one server message
#[derive(Debug, Clone)]
pub enum Applied {
    /// Canonical snapshot installed; `released` are the updates that were
    /// buffered before it, now superseded by the snapshot's state
    Snapshot {
        snapshot: Arc<InventorySnapshot>,
        released: Vec<UpdateFrame>,
    },
    /// Update applied on top of a ready connection
    Delta(InventoryDelta),
    /// Update held until the snapshot arrives
    Buffered,
    /// Server assigned the session identity
    Identity(String),
    /// Server acknowledged the join
    Joined,
    /// Nothing to do
    Ignored,
}

/// Local inventory state for one client
///
/// The snapshot survives reconnects so consumers keep a consistent (if
/// stale) view until the new connection delivers its canonical snapshot.
#[derive(Debug)]
pub struct SyncState {
    snapshot: Arc<InventorySnapshot>,
    ready: bool,
    joined: bool,
    pending: VecDeque<UpdateFrame>,
    max_pending: usize,
}

impl SyncState {
    /// Create empty state buffering at most `max_pending` early updates
    pub fn new(max_pending: usize) -> Self {
        Self {
            snapshot: Arc::new(InventorySnapshot::new()),
            ready: false,
            joined: false,
            pending: VecDeque::new(),
            max_pending,
        }
    }

    /// Forget everything tied to the previous connection
    pub fn reset_for_connection(&mut self) {
        self.ready = false;
        self.joined = false;
        self.pending.clear();
    }

    /// Whether the current connection has delivered its snapshot
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn snapshot(&self) -> Arc<InventorySnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Apply a decoded server message
    pub fn apply(&mut self, message: ServerMessage) -> Applied {
        match message {
            ServerMessage::ConnectionResponse { sid: Some(sid), .. } => Applied::Identity(sid),
            ServerMessage::ConnectionResponse { sid: None, .. } => Applied::Ignored,
            ServerMessage::Joined { room } => {
                debug!("Joined room {:?}", room);
                self.joined = true;
                Applied::Joined
            }
            ServerMessage::Left { room } => {
                debug!("Left room {:?}", room);
                self.joined = false;
                Applied::Ignored
            }
            ServerMessage::Snapshot(snapshot) => {
                self.snapshot = Arc::new(snapshot);
                self.ready = true;
                let released: Vec<UpdateFrame> = self.pending.drain(..).collect();
                if !released.is_empty() {
                    debug!(
                        "Snapshot supersedes {} update(s) received before it",
                        released.len()
                    );
                }
                Applied::Snapshot {
                    snapshot: self.snapshot(),
                    released,
                }
            }
            ServerMessage::Update(update) => {
                if !self.ready {
                    if self.pending.len() >= self.max_pending {
                        warn!(
                            "Pending update buffer full ({}), dropping oldest",
                            self.max_pending
                        );
                        self.pending.pop_front();
                    }
                    self.pending.push_back(update);
                    return Applied::Buffered;
                }
                Applied::Delta(self.replace_with(update))
            }
            ServerMessage::Unknown(event) => {
                debug!("Ignoring unknown event '{}'", event);
                Applied::Ignored
            }
        }
    }

    /// Replace the snapshot wholesale with the update's inventory
    fn replace_with(&mut self, update: UpdateFrame) -> InventoryDelta {
        let mut affected = self.snapshot.changed_products(&update.inventory);
        if let Some(id) = update.product_id {
            if !affected.contains(&id) {
                affected.push(id);
                affected.sort();
            }
        }

        self.snapshot = Arc::new(update.inventory);

        InventoryDelta {
            affected,
            snapshot: self.snapshot(),
            message: update.message,
            action: update.action,
        }
    }
}
