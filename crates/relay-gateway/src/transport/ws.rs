//! WebSocket transport over tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportFactory};
use crate::error::TransportError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl From<WsError> for TransportError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::closed(None, err.to_string()),
            other => Self::Socket(other.to_string()),
        }
    }
}

/// Gateway transport on a TLS WebSocket
#[derive(Default)]
pub struct WsTransport {
    socket: Option<Socket>,
}

impl WsTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn socket(&mut self) -> Result<&mut Socket, TransportError> {
        self.socket.as_mut().ok_or(TransportError::NotOpen)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&mut self, url: &str) -> Result<(), TransportError> {
        if let Some(mut old) = self.socket.take() {
            let _ = old.close(None).await;
        }
        let (socket, response) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket connected");
        self.socket = Some(socket);
        Ok(())
    }

    async fn read(&mut self) -> Result<String, TransportError> {
        let socket = self.socket()?;
        loop {
            let Some(message) = socket.next().await else {
                self.socket = None;
                return Err(TransportError::closed(None, "stream ended"));
            };
            match message? {
                Message::Text(text) => return Ok(text),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| TransportError::Socket(format!("binary frame: {e}")));
                }
                Message::Close(frame) => {
                    self.socket = None;
                    return Err(match frame {
                        Some(frame) => {
                            TransportError::closed(Some(u16::from(frame.code)), frame.reason)
                        }
                        None => TransportError::closed(None, "closed without frame"),
                    });
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn write_json(&mut self, value: &Value) -> Result<(), TransportError> {
        let text = value.to_string();
        self.socket()?.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        };
        match socket.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Creates a [`WsTransport`] per shard
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn create(&self, _shard_id: u32) -> Box<dyn Transport> {
        Box::new(WsTransport::new())
    }
}
