//! StockPulse Core Library
//!
//! Client-side synchronization for the StockPulse inventory service: a live
//! copy of the inventory kept current over a push channel, and progress
//! streams for model retraining jobs.
//!
//! # Architecture
//!
//! - **Push channel**: WebSocket session that joins the inventory room and
//!   receives full snapshots; reconnects with capped backoff
//! - **Job streams**: chunked HTTP bodies of `data: {json}` lines, decoded
//!   incrementally into progress events
//! - **REST**: plain request/response calls whose effects come back over the
//!   push channel
//!
//! State is published through `tokio::sync::watch` channels; consumers read
//! immutable `Arc<InventorySnapshot>` values and never see a partial update.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut client = LiveSyncClient::new(config.live_sync_config());
//! let mut events = client.take_events().unwrap();
//! client.connect(&config.topic)?;
//!
//! while let Some(event) = events.recv().await {
//!     // StatusChanged, SnapshotReplaced, Delta, Notification
//! }
//! ```
//!
//! # Modules
//!
//! - `live`: push channel client (main entry point)
//! - `job`: retraining job launch and progress stream
//! - `api`: stock REST client
//! - `models`: inventory snapshot, deltas and notifications
//! - `error`: typed errors
//! - `config`: application configuration

pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod live;
pub mod models;

pub use api::{ApiConfig, HealthStatus, InventoryApi, StockChange};
pub use config::Config;
pub use error::{ApiError, FrameError, JobError, JobFailure, LiveError};
pub use job::{
    AbortHandle, JobConfig, JobOutcome, JobStatus, JobStream, JobStreamReader, ProgressEvent,
    RetrainRequest,
};
pub use live::{Connection, ConnectionStatus, LiveEvent, LiveSyncClient, LiveSyncConfig};
pub use models::{
    InventoryDelta, InventorySnapshot, InventorySummary, Notification, ProductId, Severity,
    StockAction, StockLevel,
};
