//! Push transport
//!
//! The client talks to the push server through a [`Connector`] that opens a
//! [`PushChannel`]: a sink of outbound text frames and a stream of inbound
//! ones. [`WsConnector`] is the WebSocket implementation.

use std::pin::Pin;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::LiveError;

/// Outbound half of a push channel
pub type FrameSink = Pin<Box<dyn Sink<String, Error = LiveError> + Send>>;

/// Inbound half of a push channel; ends when the server closes
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, LiveError>> + Send>>;

/// An open, framed connection to the push server
pub struct PushChannel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens push channels; called once per (re)connection attempt
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<PushChannel, LiveError>>;
}

/// WebSocket connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout,
        }
    }

    async fn open(&self) -> Result<PushChannel, LiveError> {
        debug!("Connecting to {}", self.url);
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| LiveError::ConnectTimeout(self.connect_timeout))??;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(LiveError::from)
            .with(|text: String| future::ready(Ok::<_, LiveError>(Message::Text(text))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("Dropping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(_)) => Some(Err(LiveError::ConnectionClosed)),
                // Ping/Pong are answered by tungstenite itself
                Ok(_) => None,
                Err(e) => Some(Err(LiveError::from(e))),
            })
        });

        Ok(PushChannel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<PushChannel, LiveError>> {
        Box::pin(self.open())
    }
}
