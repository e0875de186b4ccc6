//! Error types
//!
//! Typed errors for the push channel, frame decoding, retraining job
//! streams and the stock REST API. Every variant renders a message that can
//! be shown to a user as-is.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the live push connection
#[derive(Error, Debug)]
pub enum LiveError {
    /// WebSocket protocol or I/O failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server closed the connection (or the stream ended)
    #[error("Push server closed the connection")]
    ConnectionClosed,

    /// Opening the transport took too long
    #[error("Timed out after {0:?} connecting to push server")]
    ConnectTimeout(Duration),

    /// Join was sent but no inventory snapshot arrived
    #[error("No inventory snapshot within {0:?} of joining the room")]
    JoinTimeout(Duration),

    /// No frames at all for the configured idle window
    #[error("Push connection idle for {0:?}")]
    IdleTimeout(Duration),

    /// Retry budget used up
    #[error("Gave up after {attempts} connection attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// `connect` called while a session is already running
    #[error("Client is already connected to '{0}'")]
    AlreadyConnected(String),

    /// Command issued with no running session
    #[error("Client is not connected")]
    NotConnected,
}

impl LiveError {
    /// Whether a fresh connection attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LiveError::WebSocket(_)
                | LiveError::ConnectionClosed
                | LiveError::ConnectTimeout(_)
                | LiveError::JoinTimeout(_)
                | LiveError::IdleTimeout(_)
        )
    }
}

/// A server frame that could not be turned into a typed message
#[derive(Error, Debug)]
pub enum FrameError {
    /// Payload is not valid JSON (or has the wrong shape)
    #[error("Invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is missing
    #[error("Frame is missing field '{0}'")]
    MissingField(&'static str),

    /// A field failed validation
    #[error("Invalid value for '{field}': {details}")]
    InvalidField { field: &'static str, details: String },
}

/// Errors raised when launching a retraining job
#[derive(Error, Debug)]
pub enum JobError {
    /// Server refused the request before any body was streamed
    #[error("Job request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Request could not be sent
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Dataset file could not be read
    #[error("Failed to read dataset '{path}': {source}")]
    Dataset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a job stream ended in `Failed`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Server sent an `error` frame
    #[error("{0}")]
    Server(String),

    /// Caller aborted the stream
    #[error("Job stream cancelled")]
    Cancelled,

    /// Body could not be read to the end
    #[error("Job stream connection lost: {0}")]
    Transport(String),

    /// No bytes arrived within the idle window
    #[error("No job progress for {0:?}")]
    IdleTimeout(Duration),
}

/// Errors raised by the stock REST client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport or decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with `success: false` or a non-success status
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Input refused before sending
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// Reply carried an inventory that failed validation
    #[error("Invalid inventory in response: {0}")]
    InvalidInventory(#[from] FrameError),
}

impl ApiError {
    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ApiError::Http(e) if e.is_connect() => {
                Some("Check that the stock service is running and api_url is correct.")
            }
            ApiError::InvalidInput(_) => Some("Quantities must be positive and product IDs non-empty."),
            _ => None,
        }
    }
}
