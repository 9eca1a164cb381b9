//! Cache updater
//!
//! Maps gateway dispatch events onto cache mutations. The shard calls
//! [`CacheUpdater::apply`] for every dispatch before handing the event to the
//! event dispatcher, so handlers always observe the post-update cache.

use relay_core::{
    AnyEntity, Channel, Entity, GatewayEventType, Guild, GuildMemberRemoveEvent,
    GuildMembersChunkEvent, GuildRoleDeleteEvent, GuildRoleEvent, Member, Presence, ReadyEvent,
    Role, UnavailableGuild, User, VoiceState,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::Cache;
use crate::error::CacheResult;
use crate::store::VoiceUpdate;

/// Applies dispatch events to a shared [`Cache`]
#[derive(Debug, Clone)]
pub struct CacheUpdater {
    cache: Arc<Cache>,
}

fn decode<T: DeserializeOwned>(data: &Value) -> CacheResult<T> {
    Ok(T::deserialize(data)?)
}

impl CacheUpdater {
    #[must_use]
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Apply an event, logging instead of failing
    ///
    /// A malformed payload never aborts the shard's read loop; the cache is
    /// left as it was and the event is still dispatched.
    pub fn apply(&self, event: &str, data: &Value) -> Option<AnyEntity> {
        match self.try_apply(event, data) {
            Ok(entity) => entity,
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Failed to apply event to cache");
                None
            }
        }
    }

    /// Apply an event to the cache
    ///
    /// Returns the entity the event affected: the stored value after an
    /// upsert, or the removed value after a delete. Events the cache does not
    /// track return `Ok(None)`.
    pub fn try_apply(&self, event: &str, data: &Value) -> CacheResult<Option<AnyEntity>> {
        let Some(kind) = GatewayEventType::from_str(event) else {
            return Ok(None);
        };
        let cache = &self.cache;

        let affected = match kind {
            GatewayEventType::Ready => {
                let ready: ReadyEvent = decode(data)?;
                for guild in &ready.guilds {
                    cache.insert_unavailable_guild(guild.id);
                }
                tracing::debug!(
                    user_id = %ready.user.id,
                    guilds = ready.guilds.len(),
                    "Cache primed from READY"
                );
                cache.set_current_user(ready.user.clone());
                Some(AnyEntity::User(ready.user))
            }

            GatewayEventType::GuildCreate | GatewayEventType::GuildUpdate => {
                let mut guild: Guild = decode(data)?;
                // A create always means the guild is reachable again
                guild.unavailable = false;
                Some(cache.upsert_entity(guild).into_inner().into_any())
            }

            GatewayEventType::GuildDelete => {
                let deleted: UnavailableGuild = decode(data)?;
                if deleted.unavailable {
                    cache.mark_guild_unavailable(deleted.id);
                    cache.guild(deleted.id).ok().map(|g| g.into_inner().into_any())
                } else {
                    cache.remove_guild(deleted.id).map(AnyEntity::Guild)
                }
            }

            GatewayEventType::ChannelCreate
            | GatewayEventType::ChannelUpdate
            | GatewayEventType::ThreadCreate
            | GatewayEventType::ThreadUpdate => {
                Some(cache.upsert_value::<Channel>(data)?.into_inner().into_any())
            }

            GatewayEventType::ChannelDelete | GatewayEventType::ThreadDelete => {
                let channel: Channel = decode(data)?;
                cache.delete::<Channel>(&channel.id).map(AnyEntity::Channel)
            }

            GatewayEventType::GuildMemberAdd => {
                let member: Member = decode(data)?;
                Some(cache.member_joined(member).into_inner().into_any())
            }

            GatewayEventType::GuildMemberUpdate => {
                Some(cache.upsert_value::<Member>(data)?.into_inner().into_any())
            }

            GatewayEventType::GuildMemberRemove => {
                let removed: GuildMemberRemoveEvent = decode(data)?;
                cache
                    .member_left(removed.guild_id, removed.user.id)
                    .map(AnyEntity::Member)
            }

            GatewayEventType::GuildMembersChunk => {
                let chunk: GuildMembersChunkEvent = decode(data)?;
                let guild_id = chunk.guild_id;
                for mut member in chunk.members {
                    member.guild_id = guild_id;
                    cache.upsert_entity(member);
                }
                for mut presence in chunk.presences {
                    presence.guild_id = guild_id;
                    cache.upsert_entity(presence);
                }
                tracing::trace!(
                    guild_id = %guild_id,
                    chunk_index = chunk.chunk_index,
                    chunk_count = chunk.chunk_count,
                    "Cached member chunk"
                );
                None
            }

            GatewayEventType::GuildRoleCreate | GatewayEventType::GuildRoleUpdate => {
                let GuildRoleEvent { guild_id, mut role }: GuildRoleEvent = decode(data)?;
                role.guild_id = guild_id;
                Some(cache.upsert_entity(role).into_inner().into_any())
            }

            GatewayEventType::GuildRoleDelete => {
                let deleted: GuildRoleDeleteEvent = decode(data)?;
                cache
                    .delete::<Role>(&(deleted.guild_id, deleted.role_id))
                    .map(AnyEntity::Role)
            }

            GatewayEventType::UserUpdate => {
                let user: User = decode(data)?;
                cache.set_current_user(user.clone());
                Some(AnyEntity::User(user))
            }

            GatewayEventType::PresenceUpdate => {
                Some(cache.upsert_value::<Presence>(data)?.into_inner().into_any())
            }

            GatewayEventType::VoiceStateUpdate => {
                let state: VoiceState = decode(data)?;
                match cache.update_voice_state(state) {
                    VoiceUpdate::Ignored => None,
                    update => update.state().cloned().map(AnyEntity::VoiceState),
                }
            }

            GatewayEventType::Resumed
            | GatewayEventType::MessageCreate
            | GatewayEventType::MessageUpdate
            | GatewayEventType::MessageDelete
            | GatewayEventType::TypingStart
            | GatewayEventType::VoiceServerUpdate => None,
        };

        Ok(affected)
    }
}
