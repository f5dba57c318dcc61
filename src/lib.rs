#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod phone;
pub mod prompt;
pub mod protocol;
pub mod server;
pub mod tasks;
pub mod transport;

pub use bridge::{
    CallBridge, CallBridgeBuilder, CallContext, CallLogEntry, CallLogSink, Connector, JsonlCallLogSink,
    MemoryCallLogSink, Speaker, ToolCall, ToolRegistry, ToolResult, TracingCallLogSink, Transport,
};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use protocol::client_events::ClientEvent;
pub use protocol::models::{
    AudioConfig, ContentPart, InputAudioConfig, InputAudioTranscription, Item, ItemStatus,
    ResponseConfig, Role, SessionConfig, SessionKind, SessionUpdate, Tool,
};
pub use protocol::server_events::ServerEvent;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use transport::ws::WsStream;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// A live realtime connection for one SIP call.
///
/// `RealtimeClient` is `Send` but not `Sync` because the underlying WebSocket
/// stream is not `Sync`.
#[must_use]
pub struct RealtimeClient {
    stream: WsStream,
}

impl RealtimeClient {
    /// Attach to the realtime session of an accepted call.
    ///
    /// # Errors
    /// Returns an error if the connection fails or if the URL is invalid.
    pub async fn connect(api_key: &str, call_id: &str) -> Result<Self> {
        let stream = transport::ws::connect(api_key, call_id).await?;
        Ok(Self { stream })
    }

    /// Validate, serialize and send a client event.
    ///
    /// # Errors
    /// Returns an error if validation or serialization fails or if the
    /// WebSocket send fails.
    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        event.validate()?;
        let json = serde_json::to_string(&event)?;
        tracing::trace!("Sending event: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next text frame, unparsed.
    ///
    /// Pings are answered in place and binary frames are skipped. Returns
    /// `Ok(None)` once the server closes the connection.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails.
    pub async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!("Received event: {}", safe_truncate(&text, TRACE_LOG_MAX_BYTES));
                    return Ok(Some(text.as_str().to_owned()));
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket connection closed by server");
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }

    /// Close the connection.
    ///
    /// # Errors
    /// Returns an error if the close handshake cannot be sent.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}
