//! Gateway transports
//!
//! A [`Transport`] is one shard's socket: opened (and reopened on reconnect)
//! by the shard task, then read and written from that task only. The
//! [`TransportFactory`] creates one transport per shard, which is where tests
//! plug in scripted connections.

mod ws;

pub use ws::{WsTransport, WsTransportFactory};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// A text-frame gateway socket
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open a connection to `url`, replacing any previous one
    async fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Read the next text frame
    ///
    /// Control frames are handled internally. A close from the peer is
    /// returned as [`TransportError::Closed`].
    async fn read(&mut self) -> Result<String, TransportError>;

    /// Write one JSON frame
    async fn write_json(&mut self, value: &Value) -> Result<(), TransportError>;

    /// Close the connection with a close code; closing twice is a no-op
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}

/// Creates the transport for each shard
pub trait TransportFactory: Send + Sync + 'static {
    fn create(&self, shard_id: u32) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(u32) -> Box<dyn Transport> + Send + Sync + 'static,
{
    fn create(&self, shard_id: u32) -> Box<dyn Transport> {
        self(shard_id)
    }
}
