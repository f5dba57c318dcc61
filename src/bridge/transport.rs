use std::future::Future;
use std::pin::Pin;

use crate::protocol::client_events::ClientEvent;
use crate::{RealtimeClient, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One realtime connection as seen by the call session.
///
/// Frames are handed over raw so that a malformed payload can be skipped by
/// the session without tearing the connection down.
pub trait Transport: Send {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>>;
    /// Next inbound text frame; `Ok(None)` once the peer has closed.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<String>>>;
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Opens a [`Transport`] for an accepted call.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, call_id: &'a str) -> BoxFuture<'a, Result<Box<dyn Transport>>>;
}

pub struct WsTransport {
    client: RealtimeClient,
}

impl WsTransport {
    #[must_use]
    pub const fn new(client: RealtimeClient) -> Self {
        Self { client }
    }
}

impl Transport for WsTransport {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.send(event).await })
    }

    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { self.client.next_frame().await })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.client.close().await })
    }
}

/// Connects to the hosted realtime endpoint with a bearer key.
pub struct WsConnector {
    api_key: String,
}

impl WsConnector {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl Connector for WsConnector {
    fn connect<'a>(&'a self, call_id: &'a str) -> BoxFuture<'a, Result<Box<dyn Transport>>> {
        Box::pin(async move {
            let client = RealtimeClient::connect(&self.api_key, call_id).await?;
            Ok(Box::new(WsTransport::new(client)) as Box<dyn Transport>)
        })
    }
}
