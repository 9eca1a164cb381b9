//! Shard connection task
//!
//! Per connection: open, wait for Hello, start the heartbeat, identify or
//! resume, then process frames until the connection ends. Every dispatch is
//! applied to the cache before it is handed to the dispatcher, so handlers
//! always see the post-update cache.

use rand::Rng;
use relay_cache::CacheUpdater;
use relay_core::{GatewayEventType, ReadyEvent, Snowflake};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::backoff::Backoff;
use super::heartbeat::{Beat, Heartbeat};
use super::{gateway_url, Session, ShardSettings, ShardShared, ShardState};
use crate::broadcast::{Event, EventDispatcher};
use crate::error::{GatewayError, GatewayResult, TransportError};
use crate::protocol::{
    CloseCode, GatewayMessage, HelloPayload, IdentifyPayload, OpCode, ResumePayload,
};
use crate::transport::Transport;

/// Close code for a client-initiated close that keeps the session resumable
const CLOSE_RESUMABLE: u16 = 4000;
/// Close code for a clean shutdown; the server drops the session
const CLOSE_NORMAL: u16 = 1000;

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Shutdown,
    Reconnect,
    Fatal(CloseCode),
}

pub(crate) struct ShardRunner {
    shared: Arc<ShardShared>,
    settings: Arc<ShardSettings>,
    transport: Box<dyn Transport>,
    commands: mpsc::UnboundedReceiver<GatewayMessage>,
    updater: Option<CacheUpdater>,
    dispatcher: EventDispatcher,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
}

impl ShardRunner {
    pub(crate) fn new(
        shared: Arc<ShardShared>,
        settings: Arc<ShardSettings>,
        transport: Box<dyn Transport>,
        commands: mpsc::UnboundedReceiver<GatewayMessage>,
        updater: Option<CacheUpdater>,
        dispatcher: EventDispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let backoff = Backoff::new(settings.backoff_base, settings.backoff_max);
        Self {
            shared,
            settings,
            transport,
            commands,
            updater,
            dispatcher,
            shutdown,
            backoff,
        }
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run the shard until shutdown or a fatal close
    pub(crate) async fn run(mut self) {
        let shard_id = self.shared.id;
        tracing::info!(shard_id, total = self.shared.total, "Shard starting");

        while !self.shutting_down() {
            let exit = match self.connect().await {
                Ok(()) => self.session().await,
                Err(e) => {
                    tracing::warn!(shard_id, error = %e, "Shard failed to connect");
                    Exit::Reconnect
                }
            };

            match exit {
                Exit::Shutdown => break,
                Exit::Fatal(code) => {
                    tracing::error!(shard_id, code = %code, "Shard closed with fatal code");
                    self.shared.set_fatal(code);
                    break;
                }
                Exit::Reconnect => {
                    self.shared.set_state(ShardState::Reconnecting);
                    let delay = self.backoff.next_delay();
                    tracing::info!(
                        shard_id,
                        attempt = self.backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Shard reconnecting"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => break,
                    }
                }
            }
        }

        let _ = self.transport.close(CLOSE_NORMAL).await;
        self.shared.set_state(ShardState::Disconnected);
        tracing::info!(shard_id, "Shard stopped");
    }

    async fn connect(&mut self) -> GatewayResult<()> {
        self.shared.set_state(ShardState::Connecting);
        let base = self
            .shared
            .session()
            .and_then(|s| s.resume_url)
            .unwrap_or_else(|| self.settings.url.clone());
        let url = gateway_url(&base);

        tracing::debug!(shard_id = self.shared.id, url = %url, "Opening gateway connection");
        match tokio::time::timeout(self.settings.connect_timeout, self.transport.open(&url)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::ConnectTimeout.into()),
        }
    }

    /// Drive one connection from Hello until it ends
    async fn session(&mut self) -> Exit {
        let hello = match self.read_hello().await {
            Ok(hello) => hello,
            Err(exit) => return exit,
        };
        tracing::debug!(
            shard_id = self.shared.id,
            heartbeat_interval = hello.heartbeat_interval,
            "Hello received"
        );

        let (_heartbeat, mut beats) = Heartbeat::spawn(hello.interval(), Arc::clone(&self.shared));

        if let Err(e) = self.authenticate().await {
            return self.exit_for(e);
        }

        loop {
            let connected = self.shared.state().is_connected();
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => return Exit::Shutdown,

                beat = beats.recv() => match beat {
                    Some(Beat::Send) => {
                        if let Err(e) = self.send_heartbeat().await {
                            return self.exit_for(e);
                        }
                    }
                    Some(Beat::Zombie) | None => {
                        tracing::warn!(shard_id = self.shared.id, "Heartbeat acks stopped, reconnecting");
                        let _ = self.transport.close(CLOSE_RESUMABLE).await;
                        return Exit::Reconnect;
                    }
                },

                frame = self.transport.read() => match frame {
                    Ok(text) => {
                        if let Some(exit) = self.handle_frame(&text).await {
                            return exit;
                        }
                    }
                    Err(e) => return self.exit_for_transport(e),
                },

                Some(command) = self.commands.recv(), if connected => {
                    if let Err(e) = self.send(&command).await {
                        return self.exit_for(e);
                    }
                }
            }
        }
    }

    async fn read_hello(&mut self) -> Result<HelloPayload, Exit> {
        let read = tokio::time::timeout(self.settings.connect_timeout, self.transport.read());
        let frame = tokio::select! {
            _ = self.shutdown.changed() => return Err(Exit::Shutdown),
            frame = read => frame,
        };

        let text = match frame {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(self.exit_for_transport(e)),
            Err(_) => {
                tracing::warn!(shard_id = self.shared.id, "No Hello before timeout");
                return Err(Exit::Reconnect);
            }
        };

        match GatewayMessage::from_json(&text).ok().and_then(|m| m.as_hello()) {
            Some(hello) => Ok(hello),
            None => {
                tracing::warn!(shard_id = self.shared.id, "Expected Hello as first frame");
                let _ = self.transport.close(CLOSE_RESUMABLE).await;
                Err(Exit::Reconnect)
            }
        }
    }

    /// Send Resume when a session exists, Identify otherwise
    async fn authenticate(&mut self) -> GatewayResult<()> {
        let message = match self.shared.session() {
            Some(session) => {
                let seq = self.shared.sequence();
                tracing::info!(shard_id = self.shared.id, session_id = %session.id, seq, "Resuming session");
                self.shared.set_state(ShardState::Resuming);
                GatewayMessage::resume(&ResumePayload {
                    token: self.settings.token.clone(),
                    session_id: session.id,
                    seq,
                })?
            }
            None => {
                tracing::info!(shard_id = self.shared.id, "Identifying");
                self.shared.reset_session();
                self.shared.set_state(ShardState::Identifying);
                GatewayMessage::identify(&self.identify_payload())?
            }
        };
        self.send(&message).await
    }

    fn identify_payload(&self) -> IdentifyPayload {
        IdentifyPayload {
            token: self.settings.token.clone(),
            properties: self.settings.properties.clone(),
            large_threshold: self.settings.large_threshold,
            shard: [self.shared.id, self.shared.total],
            intents: self.settings.intents.bits(),
            presence: self.settings.presence.clone(),
        }
    }

    async fn send(&mut self, message: &GatewayMessage) -> GatewayResult<()> {
        let value = message.to_value()?;
        self.transport.write_json(&value).await?;
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> GatewayResult<()> {
        let seq = self.shared.sequence();
        self.shared.beat_sent();
        tracing::trace!(shard_id = self.shared.id, seq, "Heartbeat");
        self.send(&GatewayMessage::heartbeat((seq > 0).then_some(seq)))
            .await
    }

    // === Frame Handling ===

    async fn handle_frame(&mut self, text: &str) -> Option<Exit> {
        let message = match GatewayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(shard_id = self.shared.id, error = %e, "Dropping undecodable frame");
                return None;
            }
        };

        match message.op {
            OpCode::Dispatch => {
                self.handle_dispatch(message);
                None
            }
            OpCode::Heartbeat => self.send_heartbeat().await.err().map(|e| self.exit_for(e)),
            OpCode::HeartbeatAck => {
                self.shared.ack();
                None
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id = self.shared.id, "Server requested reconnect");
                let _ = self.transport.close(CLOSE_RESUMABLE).await;
                Some(Exit::Reconnect)
            }
            OpCode::InvalidSession => {
                let resumable = message.as_invalid_session().unwrap_or(false);
                if !resumable {
                    self.shared.reset_session();
                }
                let wait = Duration::from_millis(rand::thread_rng().gen_range(1000..=5000));
                tracing::warn!(
                    shard_id = self.shared.id,
                    resumable,
                    wait_ms = wait.as_millis() as u64,
                    "Session invalidated"
                );
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    _ = self.shutdown.changed() => return Some(Exit::Shutdown),
                }
                let _ = self.transport.close(CLOSE_RESUMABLE).await;
                Some(Exit::Reconnect)
            }
            other => {
                tracing::debug!(shard_id = self.shared.id, op = %other, "Ignoring unexpected op");
                None
            }
        }
    }

    fn handle_dispatch(&mut self, message: GatewayMessage) {
        let Some(name) = message.t else {
            return;
        };
        if let Some(seq) = message.s {
            if !self.shared.advance_sequence(seq) {
                tracing::trace!(
                    shard_id = self.shared.id,
                    seq,
                    last = self.shared.sequence(),
                    event = %name,
                    "Dropping replayed dispatch"
                );
                return;
            }
        }
        let data = message.d.unwrap_or(Value::Null);

        // Cache first, so anyone woken by a state change sees the new data
        let entity = self.updater.as_ref().and_then(|u| u.apply(&name, &data));

        match GatewayEventType::from_str(&name) {
            Some(GatewayEventType::Ready) => self.on_ready(&data),
            Some(GatewayEventType::Resumed) => {
                tracing::info!(shard_id = self.shared.id, seq = self.shared.sequence(), "Session resumed");
                self.backoff.reset();
                self.shared.set_state(ShardState::Connected);
            }
            Some(GatewayEventType::GuildCreate) => {
                if let Some(id) = guild_id(&data) {
                    self.shared.guilds().insert(id);
                }
            }
            Some(GatewayEventType::GuildDelete) => {
                let unavailable = data.get("unavailable").and_then(Value::as_bool).unwrap_or(false);
                if let (Some(id), false) = (guild_id(&data), unavailable) {
                    self.shared.guilds().remove(&id);
                }
            }
            _ => {}
        }

        self.dispatcher
            .dispatch(Event::new(self.shared.id, name, message.s, data, entity));
    }

    fn on_ready(&mut self, data: &Value) {
        let ready = match ReadyEvent::deserialize(data) {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!(shard_id = self.shared.id, error = %e, "Malformed READY payload");
                return;
            }
        };

        self.shared.set_session(Session {
            id: ready.session_id.clone(),
            resume_url: ready.resume_gateway_url.clone(),
        });
        let guilds = self.shared.guilds();
        guilds.clear();
        for guild in &ready.guilds {
            guilds.insert(guild.id);
        }

        tracing::info!(
            shard_id = self.shared.id,
            session_id = %ready.session_id,
            user_id = %ready.user.id,
            guilds = ready.guilds.len(),
            "Shard ready"
        );
        self.backoff.reset();
        self.shared.set_state(ShardState::Connected);
    }

    // === Exit Classification ===

    fn exit_for(&self, err: GatewayError) -> Exit {
        match err {
            GatewayError::Transport(e) => self.exit_for_transport(e),
            other => {
                tracing::warn!(shard_id = self.shared.id, error = %other, "Shard connection failed");
                Exit::Reconnect
            }
        }
    }

    fn exit_for_transport(&self, err: TransportError) -> Exit {
        match err.close_code() {
            Some(code) if code.is_fatal() => Exit::Fatal(code),
            Some(code) if code.requires_new_session() => {
                tracing::warn!(shard_id = self.shared.id, code = %code, "Session lost, will identify");
                self.shared.reset_session();
                Exit::Reconnect
            }
            _ => {
                tracing::warn!(shard_id = self.shared.id, error = %err, "Shard connection lost");
                Exit::Reconnect
            }
        }
    }
}

fn guild_id(data: &Value) -> Option<Snowflake> {
    data.get("id").and_then(|id| Snowflake::deserialize(id).ok())
}
