//! Test helpers for integration tests
//!
//! [`MockGateway`] plays the gateway server: every time a shard opens its
//! transport, the test receives a [`MockConnection`] to script frames on and
//! read the client's frames from. [`MockHttp`] answers REST calls from a
//! queue and records what was sent.

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_common::ClientConfig;
use relay_gateway::{Transport, TransportError, TransportFactory};
use relay_http::{HttpError, HttpRequest, HttpResult, HttpTransport, RawResponse};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Gateway URL used by [`test_config`]
pub const GATEWAY_URL: &str = "wss://gateway.test";

/// How long helpers wait for the client before failing a test
pub const WAIT: Duration = Duration::from_secs(30);

/// Client config pointing at the mock gateway with fast reconnects
pub fn test_config(shards: u32) -> ClientConfig {
    let mut config = ClientConfig::new("test-token");
    config.gateway.url = Some(GATEWAY_URL.to_string());
    config.gateway.shard_count = Some(shards);
    config.gateway.backoff_base = Duration::from_millis(50);
    config.gateway.backoff_max = Duration::from_millis(200);
    config.rest.global_requests_per_second = 0;
    config
}

// ============================================================================
// Gateway
// ============================================================================

type ServerFrame = Result<String, TransportError>;

/// Server side of one shard connection
pub struct MockConnection {
    /// URL the shard opened
    pub url: String,
    to_client: mpsc::UnboundedSender<ServerFrame>,
    from_client: mpsc::UnboundedReceiver<Value>,
    client_close: Arc<Mutex<Option<u16>>>,
}

impl MockConnection {
    /// Send a raw frame to the shard
    pub fn send(&self, frame: Value) {
        let _ = self.to_client.send(Ok(frame.to_string()));
    }

    /// Send a raw text frame, which need not be valid JSON
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(text.to_string()));
    }

    pub fn hello(&self, heartbeat_interval: u64) {
        self.send(json!({ "op": 10, "d": { "heartbeat_interval": heartbeat_interval } }));
    }

    pub fn dispatch(&self, event: &str, seq: u64, data: Value) {
        self.send(json!({ "op": 0, "t": event, "s": seq, "d": data }));
    }

    /// Close from the server side with a close code
    pub fn close(&self, code: u16) {
        let _ = self
            .to_client
            .send(Err(TransportError::closed(Some(code), "closed by server")));
    }

    /// Drop the connection without a close frame
    pub fn drop_connection(&self) {
        let _ = self
            .to_client
            .send(Err(TransportError::closed(None, "connection reset")));
    }

    /// Next frame the shard wrote
    pub async fn recv(&mut self) -> Result<Value> {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .context("timed out waiting for a client frame")?
            .ok_or_else(|| anyhow!("client closed the connection"))
    }

    /// Next frame with the given op, skipping heartbeats
    pub async fn recv_op(&mut self, op: u64) -> Result<Value> {
        loop {
            let frame = self.recv().await?;
            if frame["op"] == op {
                return Ok(frame);
            }
            if frame["op"] != 1 {
                return Err(anyhow!("expected op {op}, got {frame}"));
            }
        }
    }

    /// Hello, then expect Identify and answer with READY
    pub async fn handshake(&mut self, seq: u64, ready: Value) -> Result<Value> {
        self.hello(45_000);
        let identify = self.recv_op(2).await?;
        self.dispatch("READY", seq, ready);
        Ok(identify)
    }

    /// Close code the client closed with, if it did
    pub fn client_close_code(&self) -> Option<u16> {
        *self.client_close.lock()
    }
}

struct MockTransport {
    accepted: mpsc::UnboundedSender<MockConnection>,
    auto_ack: bool,
    incoming: Option<mpsc::UnboundedReceiver<ServerFrame>>,
    loopback: Option<mpsc::UnboundedSender<ServerFrame>>,
    outgoing: Option<mpsc::UnboundedSender<Value>>,
    close_code: Arc<Mutex<Option<u16>>>,
}

impl MockTransport {
    fn reset(&mut self) {
        self.incoming = None;
        self.loopback = None;
        self.outgoing = None;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self, url: &str) -> Result<(), TransportError> {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let client_close = Arc::new(Mutex::new(None));

        let connection = MockConnection {
            url: url.to_string(),
            to_client: to_client.clone(),
            from_client,
            client_close: Arc::clone(&client_close),
        };
        self.accepted
            .send(connection)
            .map_err(|_| TransportError::Socket("gateway is gone".into()))?;

        self.incoming = Some(incoming);
        self.loopback = Some(to_client);
        self.outgoing = Some(outgoing);
        self.close_code = client_close;
        Ok(())
    }

    async fn read(&mut self) -> Result<String, TransportError> {
        let incoming = self.incoming.as_mut().ok_or(TransportError::NotOpen)?;
        match incoming.recv().await {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => {
                self.reset();
                Err(e)
            }
            None => {
                self.reset();
                Err(TransportError::closed(None, "server went away"))
            }
        }
    }

    async fn write_json(&mut self, value: &Value) -> Result<(), TransportError> {
        if self.auto_ack && value["op"] == 1 {
            if let Some(loopback) = &self.loopback {
                let _ = loopback.send(Ok(json!({ "op": 11 }).to_string()));
            }
            return Ok(());
        }
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::NotOpen)?;
        outgoing
            .send(value.clone())
            .map_err(|_| TransportError::closed(None, "server went away"))
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        if self.outgoing.is_some() {
            *self.close_code.lock() = Some(code);
        }
        self.reset();
        Ok(())
    }
}

/// Scripted gateway server for any number of shards
pub struct MockGateway {
    senders: HashMap<u32, mpsc::UnboundedSender<MockConnection>>,
    receivers: HashMap<u32, tokio::sync::Mutex<mpsc::UnboundedReceiver<MockConnection>>>,
    auto_ack: bool,
}

impl MockGateway {
    /// Gateway that acknowledges heartbeats itself
    pub fn new(shards: u32) -> Arc<Self> {
        Arc::new(Self::build(shards, true))
    }

    /// Gateway that forwards heartbeats to the test and never acks them
    pub fn without_heartbeat_acks(shards: u32) -> Arc<Self> {
        Arc::new(Self::build(shards, false))
    }

    fn build(shards: u32, auto_ack: bool) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for shard_id in 0..shards {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(shard_id, tx);
            receivers.insert(shard_id, tokio::sync::Mutex::new(rx));
        }
        Self {
            senders,
            receivers,
            auto_ack,
        }
    }

    /// Wait for the shard's next connection
    pub async fn accept(&self, shard_id: u32) -> Result<MockConnection> {
        let receiver = self
            .receivers
            .get(&shard_id)
            .ok_or_else(|| anyhow!("no shard {shard_id}"))?;
        let mut receiver = receiver.lock().await;
        tokio::time::timeout(WAIT, receiver.recv())
            .await
            .with_context(|| format!("shard {shard_id} never connected"))?
            .ok_or_else(|| anyhow!("shard {shard_id} transport dropped"))
    }
}

impl TransportFactory for MockGateway {
    fn create(&self, shard_id: u32) -> Box<dyn Transport> {
        let accepted = match self.senders.get(&shard_id) {
            Some(tx) => tx.clone(),
            // Unknown shard: a sender nobody listens on, so open fails
            None => mpsc::unbounded_channel().0,
        };
        Box::new(MockTransport {
            accepted,
            auto_ack: self.auto_ack,
            incoming: None,
            loopback: None,
            outgoing: None,
            close_code: Arc::new(Mutex::new(None)),
        })
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Scripted HTTP transport
#[derive(Default)]
pub struct MockHttp {
    responses: Mutex<VecDeque<RawResponse>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the next response
    pub fn push(&self, response: RawResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn push_json(&self, status: u16, body: &Value) {
        self.push(RawResponse::new(status).with_body(body.to_string()));
    }

    /// Requests sent so far
    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn send(&self, request: HttpRequest) -> HttpResult<RawResponse> {
        self.sent.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| HttpError::Transport("no scripted response".into()))
    }
}

/// Receive from a handler channel or fail after [`WAIT`]
pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Result<T> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .context("timed out waiting for an event")?
        .ok_or_else(|| anyhow!("event channel closed"))
}
