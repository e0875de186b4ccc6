//! Job stream framing
//!
//! The retrain endpoint answers with newline-separated text. Lines starting
//! with `data: ` carry a JSON payload; every other line is noise.

use serde_json::Value;

use crate::error::FrameError;

/// Prefix marking an event line
pub const DATA_PREFIX: &str = "data: ";

/// Fallback message for an `error` frame without one
const DEFAULT_ERROR_MESSAGE: &str = "Retraining failed";

/// Splits a byte stream into complete lines
///
/// Bytes after the last newline stay buffered until a later chunk completes
/// them, so a line (or a multi-byte character) split across reads is
/// reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Buffer prefix already known to contain no newline
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            let line = &self.buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            search_from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

/// One decoded job event
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress { message: String },
    /// Carries the whole payload object
    Complete { result: Value },
    Error { message: String },
}

impl ProgressEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    /// Whether the stream ends after this event
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }

    /// Decode one line; `Ok(None)` for lines that are not event frames
    pub fn parse_line(line: &str) -> Result<Option<Self>, FrameError> {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(payload)?;
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingField("status"))?;
        let message = value.get("message").and_then(Value::as_str).map(str::to_string);

        let event = match status {
            "progress" => ProgressEvent::Progress {
                message: message.ok_or(FrameError::MissingField("message"))?,
            },
            "complete" => ProgressEvent::Complete { result: value },
            "error" => ProgressEvent::Error {
                message: message.unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
            },
            other => {
                return Err(FrameError::InvalidField {
                    field: "status",
                    details: format!("unknown status '{}'", other),
                })
            }
        };
        Ok(Some(event))
    }
}
