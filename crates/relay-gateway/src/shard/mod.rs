//! Gateway shards
//!
//! A [`Shard`] is the cheap, cloneable handle to one gateway session. The
//! connection itself runs in a single task per shard (see `runner`), which
//! owns the socket and processes frames strictly in arrival order.

mod backoff;
mod heartbeat;
mod runner;
mod state;

pub use backoff::Backoff;
pub use state::{ShardInfo, ShardState};

pub(crate) use runner::ShardRunner;

use dashmap::DashSet;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::{Mutex, RwLock};
use relay_common::GatewayConfig;
use relay_core::Snowflake;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{CloseCode, GatewayMessage, IdentifyProperties, Intents, PresenceUpdatePayload};

/// Gateway API version requested on connect
pub const API_VERSION: u8 = 10;

/// Append the version and encoding query to a gateway URL
#[must_use]
pub fn gateway_url(base: &str) -> String {
    if base.contains('?') {
        base.to_string()
    } else {
        format!("{}?v={API_VERSION}&encoding=json", base.trim_end_matches('/'))
    }
}

// === Settings ===

/// Connection settings shared by every shard of a manager
#[derive(Clone)]
pub struct ShardSettings {
    pub token: String,
    /// Gateway URL without query
    pub url: String,
    /// Total shard count
    pub total: u32,
    pub intents: Intents,
    pub large_threshold: u8,
    pub properties: IdentifyProperties,
    /// Presence sent with Identify
    pub presence: Option<PresenceUpdatePayload>,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Rate-limited commands per minute; zero disables the limit
    pub commands_per_minute: u32,
}

impl ShardSettings {
    /// Build settings from the gateway config once URL and shard count are known
    #[must_use]
    pub fn from_config(
        token: impl Into<String>,
        config: &GatewayConfig,
        url: impl Into<String>,
        total: u32,
    ) -> Self {
        Self {
            token: token.into(),
            url: url.into(),
            total: total.max(1),
            intents: Intents::from_bits_truncate(config.intents),
            large_threshold: config.large_threshold,
            properties: IdentifyProperties::default(),
            presence: None,
            connect_timeout: config.connect_timeout,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            commands_per_minute: config.commands_per_minute,
        }
    }

    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }
}

impl fmt::Debug for ShardSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardSettings")
            .field("url", &self.url)
            .field("total", &self.total)
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("commands_per_minute", &self.commands_per_minute)
            .finish()
    }
}

// === Shared State ===

/// Resumable session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub(crate) id: String,
    pub(crate) resume_url: Option<String>,
}

type CommandLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// State shared between a shard's handle and its task
pub(crate) struct ShardShared {
    pub(crate) id: u32,
    pub(crate) total: u32,
    state: watch::Sender<ShardState>,
    sequence: AtomicU64,
    session: RwLock<Option<Session>>,
    guilds: DashSet<Snowflake>,
    fatal: Mutex<Option<CloseCode>>,
    commands: mpsc::UnboundedSender<GatewayMessage>,
    limiter: Option<CommandLimiter>,
    acked: AtomicBool,
    last_beat: Mutex<Option<Instant>>,
    latency: Mutex<Option<Duration>>,
}

impl ShardShared {
    pub(crate) fn new(
        id: u32,
        settings: &ShardSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<GatewayMessage>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let limiter = NonZeroU32::new(settings.commands_per_minute)
            .map(|n| RateLimiter::direct(Quota::per_minute(n)));
        let shared = Arc::new(Self {
            id,
            total: settings.total,
            state: watch::Sender::new(ShardState::Idle),
            sequence: AtomicU64::new(0),
            session: RwLock::new(None),
            guilds: DashSet::new(),
            fatal: Mutex::new(None),
            commands,
            limiter,
            acked: AtomicBool::new(true),
            last_beat: Mutex::new(None),
            latency: Mutex::new(None),
        });
        (shared, rx)
    }

    pub(crate) fn state(&self) -> ShardState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: ShardState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(shard_id = self.id, from = %previous, to = %state, "Shard state changed");
        }
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Record `seq` if it is newer than the last one; false for replays
    pub(crate) fn advance_sequence(&self, seq: u64) -> bool {
        self.sequence.fetch_max(seq, Ordering::AcqRel) < seq
    }

    pub(crate) fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    pub(crate) fn set_session(&self, session: Session) {
        *self.session.write() = Some(session);
    }

    /// Forget the session so the next connection identifies from scratch
    pub(crate) fn reset_session(&self) {
        *self.session.write() = None;
        self.sequence.store(0, Ordering::Release);
    }

    pub(crate) fn guilds(&self) -> &DashSet<Snowflake> {
        &self.guilds
    }

    pub(crate) fn set_fatal(&self, code: CloseCode) {
        *self.fatal.lock() = Some(code);
    }

    // === Heartbeat ===

    pub(crate) fn reset_heartbeat(&self) {
        self.acked.store(true, Ordering::Release);
        *self.last_beat.lock() = None;
    }

    pub(crate) fn beat_sent(&self) {
        *self.last_beat.lock() = Some(Instant::now());
    }

    /// Consume the ack flag for the previous beat
    pub(crate) fn take_ack(&self) -> bool {
        self.acked.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn ack(&self) {
        self.acked.store(true, Ordering::Release);
        if let Some(sent) = *self.last_beat.lock() {
            *self.latency.lock() = Some(sent.elapsed());
        }
    }

    pub(crate) fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}

// === Shard Handle ===

/// Handle to one gateway shard
#[derive(Clone)]
pub struct Shard {
    shared: Arc<ShardShared>,
}

impl Shard {
    pub(crate) fn from_shared(shared: Arc<ShardShared>) -> Self {
        Self { shared }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// End a shard whose task never ran
    pub(crate) fn mark_stopped(&self) {
        self.shared.set_state(ShardState::Disconnected);
    }

    #[inline]
    #[must_use]
    pub fn total(&self) -> u32 {
        self.shared.total
    }

    #[must_use]
    pub fn state(&self) -> ShardState {
        self.shared.state()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ShardState> {
        self.shared.state.subscribe()
    }

    /// Last dispatch sequence processed
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.shared.sequence()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.session().map(|s| s.id)
    }

    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.shared.latency()
    }

    /// Check if a guild is routed to this shard
    #[must_use]
    pub fn has_guild(&self, guild_id: Snowflake) -> bool {
        self.shared.guilds.contains(&guild_id)
    }

    #[must_use]
    pub fn guild_ids(&self) -> Vec<Snowflake> {
        self.shared.guilds.iter().map(|id| *id).collect()
    }

    #[must_use]
    pub fn info(&self) -> ShardInfo {
        ShardInfo {
            id: self.shared.id,
            total: self.shared.total,
            state: self.shared.state(),
            sequence: self.shared.sequence(),
            session_id: self.session_id(),
            latency: self.shared.latency(),
            guilds: self.shared.guilds.len(),
        }
    }

    /// Wait until the shard has a session
    ///
    /// Resolves once READY or RESUMED arrives. Fails if the shard stops first:
    /// with the close code when the server ended it, or `Closed` after shutdown.
    pub async fn wait_ready(&self) -> GatewayResult<()> {
        let mut rx = self.shared.state.subscribe();
        let state = *rx
            .wait_for(|state| state.is_connected() || state.is_terminal())
            .await
            .map_err(|_| GatewayError::Closed)?;

        if state.is_connected() {
            return Ok(());
        }
        match *self.shared.fatal.lock() {
            Some(code) => Err(GatewayError::FatalClose {
                shard_id: self.shared.id,
                code,
            }),
            None => Err(GatewayError::Closed),
        }
    }

    /// Queue a command for this shard
    ///
    /// Waits on the per-shard command limit, then hands the frame to the shard
    /// task. Commands queued while the shard reconnects go out once it is
    /// connected again.
    pub async fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        if self.shared.state().is_terminal() {
            return Err(GatewayError::Closed);
        }
        if let Some(limiter) = &self.shared.limiter {
            limiter.until_ready().await;
        }
        tracing::trace!(shard_id = self.shared.id, op = %message.op, "Command queued");
        self.shared
            .commands
            .send(message)
            .map_err(|_| GatewayError::Closed)
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.shared.id)
            .field("total", &self.shared.total)
            .field("state", &self.shared.state())
            .field("sequence", &self.shared.sequence())
            .finish()
    }
}
