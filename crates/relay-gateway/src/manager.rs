//! Shard manager
//!
//! Owns every shard of a client, starts one task per shard and routes
//! per-guild commands to the shard that holds the guild.

use parking_lot::Mutex;
use relay_cache::CacheUpdater;
use relay_core::Snowflake;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcast::EventDispatcher;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    GatewayMessage, PresenceUpdatePayload, RequestGuildMembersPayload, VoiceStateUpdatePayload,
};
use crate::shard::{Shard, ShardInfo, ShardRunner, ShardSettings, ShardShared, ShardState};
use crate::transport::TransportFactory;

/// Shard that owns `guild_id` under the platform's sharding formula
#[must_use]
pub fn shard_id_for(guild_id: Snowflake, total: u32) -> u32 {
    ((guild_id.into_inner() >> 22) % u64::from(total.max(1))) as u32
}

/// Shard holding `guild_id`: the shard that reported it, else the formula
pub(crate) fn route_guild(shards: &[Shard], guild_id: Snowflake) -> u32 {
    shards
        .iter()
        .find(|shard| shard.has_guild(guild_id))
        .map_or_else(|| shard_id_for(guild_id, u32::try_from(shards.len()).unwrap_or(u32::MAX)), Shard::id)
}

/// Manages all shards of one client
pub struct ShardManager {
    settings: Arc<ShardSettings>,
    shards: Vec<Shard>,
    runners: Mutex<Vec<ShardRunner>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    dispatcher: EventDispatcher,
}

impl ShardManager {
    /// Create shards `0..settings.total`; nothing connects until [`start`](Self::start)
    pub fn new(
        settings: ShardSettings,
        factory: &dyn TransportFactory,
        updater: Option<CacheUpdater>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let settings = Arc::new(settings);
        let (shutdown, _) = watch::channel(false);

        let mut shards = Vec::with_capacity(settings.total as usize);
        let mut runners = Vec::with_capacity(settings.total as usize);
        for id in 0..settings.total {
            let (shared, commands) = ShardShared::new(id, &settings);
            runners.push(ShardRunner::new(
                Arc::clone(&shared),
                Arc::clone(&settings),
                factory.create(id),
                commands,
                updater.clone(),
                dispatcher.clone(),
                shutdown.subscribe(),
            ));
            shards.push(Shard::from_shared(shared));
        }

        dispatcher.attach_shards(&shards);
        tracing::debug!(total = settings.total, url = %settings.url, "Shard manager created");

        Self {
            settings,
            shards,
            runners: Mutex::new(runners),
            tasks: Mutex::new(Vec::new()),
            shutdown,
            dispatcher,
        }
    }

    /// Spawn every shard task; calling it again does nothing
    pub fn start(&self) -> usize {
        let runners: Vec<_> = self.runners.lock().drain(..).collect();
        let started = runners.len();
        let mut tasks = self.tasks.lock();
        for runner in runners {
            tasks.push(tokio::spawn(runner.run()));
        }
        if started > 0 {
            tracing::info!(shards = started, "Shards started");
        }
        started
    }

    /// Wait until every shard has a session
    ///
    /// Returns the first shard failure, e.g. an authentication close.
    pub async fn wait_ready(&self) -> GatewayResult<()> {
        for shard in &self.shards {
            shard.wait_ready().await?;
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn total(&self) -> u32 {
        self.settings.total
    }

    #[must_use]
    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    #[must_use]
    pub fn shard(&self, shard_id: u32) -> Option<&Shard> {
        self.shards.get(shard_id as usize)
    }

    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Shard ID for a guild: the shard that reported it, else the formula
    #[must_use]
    pub fn shard_id_for_guild(&self, guild_id: Snowflake) -> u32 {
        route_guild(&self.shards, guild_id)
    }

    pub fn shard_for_guild(&self, guild_id: Snowflake) -> GatewayResult<&Shard> {
        let shard_id = self.shard_id_for_guild(guild_id);
        self.shard(shard_id).ok_or(GatewayError::UnknownShard(shard_id))
    }

    /// Send a command frame to one shard
    pub async fn send(&self, shard_id: u32, message: GatewayMessage) -> GatewayResult<()> {
        self.shard(shard_id)
            .ok_or(GatewayError::UnknownShard(shard_id))?
            .send(message)
            .await
    }

    /// Join, move or leave voice in a guild (op 4)
    pub async fn update_voice_state(&self, payload: VoiceStateUpdatePayload) -> GatewayResult<()> {
        let shard = self.shard_for_guild(payload.guild_id)?;
        tracing::debug!(
            shard_id = shard.id(),
            guild_id = %payload.guild_id,
            channel_id = ?payload.channel_id,
            "Voice state update"
        );
        shard
            .send(GatewayMessage::voice_state_update(&payload)?)
            .await
    }

    /// Request members of a guild (op 8); chunks arrive as GUILD_MEMBERS_CHUNK
    pub async fn request_guild_members(
        &self,
        payload: RequestGuildMembersPayload,
    ) -> GatewayResult<()> {
        let shard = self.shard_for_guild(payload.guild_id)?;
        tracing::debug!(shard_id = shard.id(), guild_id = %payload.guild_id, "Requesting guild members");
        shard
            .send(GatewayMessage::request_guild_members(&payload)?)
            .await
    }

    /// Update presence on every shard (op 3)
    pub async fn update_presence(&self, payload: PresenceUpdatePayload) -> GatewayResult<()> {
        let message = GatewayMessage::presence_update(&payload)?;
        for shard in &self.shards {
            shard.send(message.clone()).await?;
        }
        Ok(())
    }

    /// Status of every shard
    #[must_use]
    pub fn info(&self) -> Vec<ShardInfo> {
        self.shards.iter().map(Shard::info).collect()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop every shard and wait for their tasks to finish
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        tracing::info!(shards = self.shards.len(), "Shutting down shards");

        // Never-started shards have no task to report their end
        self.runners.lock().clear();
        for shard in &self.shards {
            if shard.state() == ShardState::Idle {
                shard.mark_stopped();
            }
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Shard task ended abnormally");
            }
        }
    }
}

impl fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardManager")
            .field("settings", &self.settings)
            .field("shards", &self.shards)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
