//! The client-wide object cache
//!
//! One [`Cache`] is created per client and shared by `Arc` between the shards
//! (via the cache updater) and the REST client. Embedded children are always
//! detached and stored under their own keys; parents keep ID indexes that are
//! resolved through the child stores at read time.

use parking_lot::RwLock;
use relay_common::{CacheConfig, CacheMode};
use relay_core::{
    AnyEntity, Channel, Entity, Guild, Member, Permissions, Presence, Role, Snowflake, User,
    VoiceState,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::CacheResult;
use crate::store::{Cached, EntityCache, VoiceStateStore, VoiceUpdate};

/// An entity type with its own store inside [`Cache`]
pub trait Stored: Entity {
    /// The store holding this type
    fn store(cache: &Cache) -> &EntityCache<Self>;

    /// Record the stored entity in its parent's indexes
    ///
    /// Runs under the parent's lock and must re-check that the entity is
    /// still stored, since a concurrent delete may have unlinked it already.
    fn link(&self, _cache: &Cache) {}

    /// Remove a deleted entity from its parent's indexes
    fn unlink(&self, _cache: &Cache) {}
}

impl Stored for Channel {
    fn store(cache: &Cache) -> &EntityCache<Self> {
        &cache.channels
    }

    fn link(&self, cache: &Cache) {
        if let Some(guild_id) = self.guild_id {
            cache.guilds.update(&guild_id, |guild| {
                if cache.channels.contains(&self.id) {
                    guild.channel_ids.insert(self.id);
                }
            });
        }
    }

    fn unlink(&self, cache: &Cache) {
        if let Some(guild_id) = self.guild_id {
            cache.guilds.update(&guild_id, |guild| {
                guild.channel_ids.remove(&self.id);
            });
        }
    }
}

impl Stored for Guild {
    fn store(cache: &Cache) -> &EntityCache<Self> {
        &cache.guilds
    }

    /// Cascade: everything that only exists inside the guild goes with it
    fn unlink(&self, cache: &Cache) {
        for channel_id in &self.channel_ids {
            cache.channels.delete(channel_id);
        }
        for role_id in &self.role_ids {
            cache.roles.delete(&(self.id, *role_id));
        }
        cache.members.retain(|m| m.guild_id != self.id);
        cache.presences.retain(|p| p.guild_id != self.id);
        cache.voice_states.remove_guild(self.id);
    }
}

impl Stored for User {
    fn store(cache: &Cache) -> &EntityCache<Self> {
        &cache.users
    }
}

impl Stored for Member {
    fn store(cache: &Cache) -> &EntityCache<Self> {
        &cache.members
    }

    fn link(&self, cache: &Cache) {
        cache.guilds.update(&self.guild_id, |guild| {
            if cache.members.contains(&self.key()) {
                guild.member_ids.insert(self.user_id);
            }
        });
    }

    fn unlink(&self, cache: &Cache) {
        cache.guilds.update(&self.guild_id, |guild| {
            guild.member_ids.remove(&self.user_id);
        });
    }
}

impl Stored for Role {
    fn store(cache: &Cache) -> &EntityCache<Self> {
        &cache.roles
    }

    fn link(&self, cache: &Cache) {
        cache.guilds.update(&self.guild_id, |guild| {
            if cache.roles.contains(&self.key()) {
                guild.role_ids.insert(self.id);
            }
        });
    }

    fn unlink(&self, cache: &Cache) {
        cache.guilds.update(&self.guild_id, |guild| {
            guild.role_ids.remove(&self.id);
        });
        // Members keep pointing at the role otherwise
        cache.members.for_each(|member| {
            let (key, holds) =
                member.with(|m| (m.key(), m.guild_id == self.guild_id && m.has_role(self.id)));
            if holds {
                cache.members.update(&key, |m| m.roles.retain(|r| *r != self.id));
            }
        });
    }
}

impl Stored for Presence {
    fn store(cache: &Cache) -> &EntityCache<Self> {
        &cache.presences
    }
}

/// Entity counts per store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub guilds: usize,
    pub channels: usize,
    pub users: usize,
    pub members: usize,
    pub roles: usize,
    pub presences: usize,
    pub voice_states: usize,
}

/// Concurrent object cache
#[derive(Debug)]
pub struct Cache {
    mode: CacheMode,
    channels: EntityCache<Channel>,
    guilds: EntityCache<Guild>,
    users: EntityCache<User>,
    members: EntityCache<Member>,
    roles: EntityCache<Role>,
    presences: EntityCache<Presence>,
    voice_states: VoiceStateStore,
    current_user: RwLock<Option<User>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Cache {
    /// Create an empty cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let mode = config.mode;
        Self {
            mode,
            channels: EntityCache::new(mode),
            guilds: EntityCache::new(mode),
            users: EntityCache::new(mode),
            members: EntityCache::new(mode),
            roles: EntityCache::new(mode),
            presences: EntityCache::new(mode),
            voice_states: VoiceStateStore::new(mode),
            current_user: RwLock::new(None),
        }
    }

    /// Create an empty cache with the given mode
    #[must_use]
    pub fn with_mode(mode: CacheMode) -> Self {
        Self::new(CacheConfig { mode })
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    /// Decode raw JSON and upsert it
    ///
    /// The payload is decoded into a scratch value first; a decode error
    /// leaves the cache untouched.
    pub fn upsert<T: Stored>(&self, raw: &[u8]) -> CacheResult<Cached<T>> {
        let candidate: T = serde_json::from_slice(raw)?;
        Ok(self.upsert_entity(candidate))
    }

    /// Decode a JSON value and upsert it
    pub fn upsert_value<T: Stored>(&self, value: &Value) -> CacheResult<Cached<T>> {
        let candidate = T::deserialize(value)?;
        Ok(self.upsert_entity(candidate))
    }

    /// Upsert an already decoded entity, caching its children independently
    pub fn upsert_entity<T: Stored>(&self, mut candidate: T) -> Cached<T> {
        for child in candidate.detach() {
            self.upsert_any(child);
        }
        let stored = T::store(self).upsert(candidate);
        // Linking takes the parent's lock, so never hold the entity's lock here
        match &stored {
            Cached::Snapshot(entity) => entity.link(self),
            Cached::Live(_) => stored.snapshot().link(self),
        }
        stored
    }

    /// Upsert any entity, routing it to the right store
    ///
    /// Returns a snapshot of the stored value (for voice states, the value
    /// after the join/move/leave was applied).
    pub fn upsert_any(&self, entity: AnyEntity) -> Option<AnyEntity> {
        let stored = match entity {
            AnyEntity::Channel(e) => self.upsert_entity(e).into_inner().into_any(),
            AnyEntity::Guild(e) => self.upsert_entity(e).into_inner().into_any(),
            AnyEntity::User(e) => self.upsert_entity(e).into_inner().into_any(),
            AnyEntity::Member(e) => self.upsert_entity(e).into_inner().into_any(),
            AnyEntity::Role(e) => self.upsert_entity(e).into_inner().into_any(),
            AnyEntity::Presence(e) => self.upsert_entity(e).into_inner().into_any(),
            AnyEntity::VoiceState(e) => {
                return self.update_voice_state(e).state().cloned().map(AnyEntity::VoiceState)
            }
        };
        Some(stored)
    }

    /// Look up an entity by key
    pub fn get<T: Stored>(&self, key: &T::Key) -> CacheResult<Cached<T>> {
        T::store(self).get(key)
    }

    /// Remove an entity and unlink it from its parent; idempotent
    pub fn delete<T: Stored>(&self, key: &T::Key) -> Option<T> {
        let removed = T::store(self).delete(key)?;
        removed.unlink(self);
        Some(removed)
    }

    /// Entity counts per store
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            guilds: self.guilds.len(),
            channels: self.channels.len(),
            users: self.users.len(),
            members: self.members.len(),
            roles: self.roles.len(),
            presences: self.presences.len(),
            voice_states: self.voice_states.len(),
        }
    }

    /// Drop every cached entity
    pub fn clear(&self) {
        self.channels.clear();
        self.guilds.clear();
        self.users.clear();
        self.members.clear();
        self.roles.clear();
        self.presences.clear();
        self.voice_states.clear();
        *self.current_user.write() = None;
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    pub fn channel(&self, id: Snowflake) -> CacheResult<Cached<Channel>> {
        self.channels.get(&id)
    }

    pub fn guild(&self, id: Snowflake) -> CacheResult<Cached<Guild>> {
        self.guilds.get(&id)
    }

    pub fn user(&self, id: Snowflake) -> CacheResult<Cached<User>> {
        self.users.get(&id)
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> CacheResult<Cached<Member>> {
        self.members.get(&(guild_id, user_id))
    }

    pub fn role(&self, guild_id: Snowflake, role_id: Snowflake) -> CacheResult<Cached<Role>> {
        self.roles.get(&(guild_id, role_id))
    }

    pub fn presence(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> CacheResult<Cached<Presence>> {
        self.presences.get(&(guild_id, user_id))
    }

    /// Mark a guild unavailable (outage) without dropping its children
    pub fn mark_guild_unavailable(&self, id: Snowflake) -> bool {
        self.guilds.update(&id, |guild| guild.unavailable = true)
    }

    /// Record a guild announced in READY if it is not cached yet
    pub fn insert_unavailable_guild(&self, id: Snowflake) -> bool {
        let mut guild = Guild::new(id, String::new(), Snowflake::default());
        guild.unavailable = true;
        self.guilds.insert_if_absent(guild)
    }

    /// The logged-in user from READY / USER_UPDATE
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.current_user.read().clone()
    }

    /// Replace the logged-in user and cache it as a regular user
    pub fn set_current_user(&self, user: User) {
        *self.current_user.write() = Some(user.clone());
        self.upsert_entity(user);
    }

    // =========================================================================
    // Cross-reference resolution
    // =========================================================================

    /// Channels indexed under a guild
    pub fn guild_channels(&self, guild_id: Snowflake) -> CacheResult<Vec<Cached<Channel>>> {
        let ids = self.guild(guild_id)?.with(|g| g.channel_ids.clone());
        Ok(ids.iter().filter_map(|id| self.channels.get(id).ok()).collect())
    }

    /// Roles indexed under a guild
    pub fn guild_roles(&self, guild_id: Snowflake) -> CacheResult<Vec<Cached<Role>>> {
        let ids = self.guild(guild_id)?.with(|g| g.role_ids.clone());
        Ok(ids
            .iter()
            .filter_map(|id| self.roles.get(&(guild_id, *id)).ok())
            .collect())
    }

    /// Members indexed under a guild
    pub fn guild_members(&self, guild_id: Snowflake) -> CacheResult<Vec<Cached<Member>>> {
        let ids = self.guild(guild_id)?.with(|g| g.member_ids.clone());
        Ok(ids
            .iter()
            .filter_map(|id| self.members.get(&(guild_id, *id)).ok())
            .collect())
    }

    /// DM recipients, resolved through the user store at read time
    pub fn channel_recipients(&self, channel_id: Snowflake) -> CacheResult<Vec<Cached<User>>> {
        let ids = self.channel(channel_id)?.with(|c| c.recipient_ids.clone());
        Ok(ids.iter().filter_map(|id| self.users.get(id).ok()).collect())
    }

    /// The user behind a member
    pub fn member_user(&self, guild_id: Snowflake, user_id: Snowflake) -> CacheResult<Cached<User>> {
        let user_id = self.member(guild_id, user_id)?.with(|m| m.user_id);
        self.user(user_id)
    }

    // =========================================================================
    // Voice
    // =========================================================================

    /// Apply a voice state update (join, move or leave)
    pub fn update_voice_state(&self, mut state: VoiceState) -> VoiceUpdate {
        for child in state.detach() {
            self.upsert_any(child);
        }
        self.voice_states.apply(state)
    }

    /// Every voice session in a guild
    #[must_use]
    pub fn voice_states(&self, guild_id: Snowflake) -> Vec<Cached<VoiceState>> {
        self.voice_states.guild(guild_id)
    }

    /// Voice sessions a user holds in a guild
    #[must_use]
    pub fn user_voice_states(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> Vec<Cached<VoiceState>> {
        self.voice_states.user(guild_id, user_id)
    }

    /// Users connected to a voice channel
    #[must_use]
    pub fn voice_channel_users(&self, guild_id: Snowflake, channel_id: Snowflake) -> Vec<Snowflake> {
        self.voice_states.channel_users(guild_id, channel_id)
    }

    // =========================================================================
    // Permissions
    // =========================================================================

    /// Guild-level permissions of a member
    ///
    /// The owner and administrators get every permission; otherwise the
    /// @everyone role is combined with each role the member holds.
    pub fn member_permissions(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> CacheResult<Permissions> {
        let owner_id = self.guild(guild_id)?.with(|g| g.owner_id);
        if owner_id == user_id {
            return Ok(Permissions::ALL);
        }

        let role_ids = self.member(guild_id, user_id)?.with(|m| m.roles.clone());
        let everyone = self
            .roles
            .peek(&(guild_id, guild_id))
            .map(|r| r.permissions)
            .unwrap_or_default();
        let combined = role_ids
            .iter()
            .filter_map(|id| self.roles.peek(&(guild_id, *id)))
            .fold(everyone, |acc, role| acc | role.permissions);

        if combined.contains(Permissions::ADMINISTRATOR) {
            return Ok(Permissions::ALL);
        }
        Ok(combined)
    }

    /// Channel-level permissions of a member, applying overwrites
    ///
    /// Overwrites apply in order: @everyone, then the member's roles combined,
    /// then the member-specific overwrite.
    pub fn channel_permissions(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> CacheResult<Permissions> {
        let channel = self.channel(channel_id)?.into_inner();
        let Some(guild_id) = channel.guild_id else {
            return Ok(Permissions::ALL);
        };

        let base = self.member_permissions(guild_id, user_id)?;
        if base == Permissions::ALL {
            return Ok(Permissions::ALL);
        }

        let role_ids = self.member(guild_id, user_id)?.with(|m| m.roles.clone());
        let overwrites = &channel.permission_overwrites;

        let mut perms = base;
        if let Some(everyone) = overwrites.iter().find(|o| o.id == guild_id) {
            perms = perms.apply_overwrite(everyone.allow, everyone.deny);
        }

        let (allow, deny) = overwrites
            .iter()
            .filter(|o| o.is_role() && role_ids.contains(&o.id))
            .fold((Permissions::empty(), Permissions::empty()), |(a, d), o| {
                (a | o.allow, d | o.deny)
            });
        perms = perms.apply_overwrite(allow, deny);

        if let Some(member) = overwrites.iter().find(|o| !o.is_role() && o.id == user_id) {
            perms = perms.apply_overwrite(member.allow, member.deny);
        }

        Ok(perms)
    }

    /// Record a member joining a guild
    ///
    /// Unlike a plain upsert this also moves the guild's member count.
    pub fn member_joined(&self, member: Member) -> Cached<Member> {
        let guild_id = member.guild_id;
        let stored = self.upsert_entity(member);
        self.guilds.update(&guild_id, Guild::record_join);
        stored
    }

    /// Record a member leaving a guild, returning the cached member if any
    pub fn member_left(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.guilds.update(&guild_id, Guild::record_leave);
        self.delete::<Member>(&(guild_id, user_id))
    }

    /// Remove a guild and everything cached under it
    pub fn remove_guild(&self, guild_id: Snowflake) -> Option<Guild> {
        self.delete::<Guild>(&guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use relay_core::PermissionOverwrite;

    const GUILD_CREATE: &str = r#"{
        "id": "100",
        "name": "Rustaceans",
        "owner_id": "1",
        "member_count": 2,
        "channels": [{"id": "200", "type": 0, "name": "general"}],
        "roles": [
            {"id": "100", "name": "@everyone", "permissions": "1024"},
            {"id": "300", "name": "mods", "permissions": "8192"}
        ],
        "members": [
            {"user": {"id": "1", "username": "owner"}, "roles": []},
            {"user": {"id": "2", "username": "mod"}, "roles": ["300"]}
        ],
        "voice_states": [{"channel_id": "201", "user_id": "2", "session_id": "abc"}]
    }"#;

    fn seeded(mode: CacheMode) -> Cache {
        let cache = Cache::with_mode(mode);
        cache.upsert::<Guild>(GUILD_CREATE.as_bytes()).unwrap();
        cache
    }

    #[test]
    fn test_guild_children_are_cached_independently() {
        let cache = seeded(CacheMode::Immutable);
        let stats = cache.stats();
        assert_eq!(stats.guilds, 1);
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.roles, 2);
        assert_eq!(stats.members, 2);
        assert_eq!(stats.users, 2);
        assert_eq!(stats.voice_states, 1);

        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert!(guild.channels.is_empty());
        assert!(guild.members.is_empty());
        assert_eq!(guild.member_ids.len(), 2);

        let channel = cache.channel(Snowflake::new(200)).unwrap().into_inner();
        assert_eq!(channel.guild_id, Some(Snowflake::new(100)));
        assert_eq!(cache.guild_channels(Snowflake::new(100)).unwrap().len(), 1);
        assert_eq!(cache.guild_members(Snowflake::new(100)).unwrap().len(), 2);
        assert_eq!(cache.guild_roles(Snowflake::new(100)).unwrap().len(), 2);

        let user = cache
            .member_user(Snowflake::new(100), Snowflake::new(2))
            .unwrap()
            .into_inner();
        assert_eq!(user.username, "mod");
    }

    #[test]
    fn test_decode_error_leaves_cache_untouched() {
        let cache = seeded(CacheMode::Immutable);
        let before = cache.stats();
        let err = cache.upsert::<Channel>(b"{\"id\": [}").unwrap_err();
        assert!(matches!(err, CacheError::Decode(_)));
        assert_eq!(cache.stats(), before);
    }

    #[test]
    fn test_channel_create_links_into_guild() {
        let cache = seeded(CacheMode::Immutable);
        cache
            .upsert::<Channel>(br#"{"id":"250","type":2,"guild_id":"100","name":"voice"}"#)
            .unwrap();
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert!(guild.channel_ids.contains(&Snowflake::new(250)));

        cache.delete::<Channel>(&Snowflake::new(250));
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert!(!guild.channel_ids.contains(&Snowflake::new(250)));
    }

    #[test]
    fn test_link_skips_entities_deleted_meanwhile() {
        let cache = seeded(CacheMode::Mutable);
        let channel = Channel::new_text(Snowflake::new(260), Snowflake::new(100), "gone");
        let role = Role::new(Snowflake::new(310), Snowflake::new(100), "gone");

        // Linking after the store already dropped the entity must not index it
        channel.link(&cache);
        role.link(&cache);
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert!(!guild.channel_ids.contains(&Snowflake::new(260)));
        assert!(!guild.role_ids.contains(&Snowflake::new(310)));

        cache.upsert_entity(channel);
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert!(guild.channel_ids.contains(&Snowflake::new(260)));
    }

    #[test]
    fn test_dm_recipients_resolve_through_user_store() {
        let cache = Cache::with_mode(CacheMode::Mutable);
        cache
            .upsert::<Channel>(
                br#"{"id":"9","type":1,"recipients":[{"id":"5","username":"before"}]}"#,
            )
            .unwrap();
        // A later user update is visible through the channel's recipients
        cache
            .upsert::<User>(br#"{"id":"5","username":"after"}"#)
            .unwrap();

        let recipients = cache.channel_recipients(Snowflake::new(9)).unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].snapshot().username, "after");
        let channel = cache.channel(Snowflake::new(9)).unwrap().snapshot();
        assert!(channel.recipients.is_empty());
    }

    #[test]
    fn test_remove_guild_cascades() {
        let cache = seeded(CacheMode::Immutable);
        let removed = cache.remove_guild(Snowflake::new(100)).unwrap();
        assert_eq!(removed.name, "Rustaceans");

        let stats = cache.stats();
        assert_eq!(stats.guilds, 0);
        assert_eq!(stats.channels, 0);
        assert_eq!(stats.roles, 0);
        assert_eq!(stats.members, 0);
        assert_eq!(stats.voice_states, 0);
        // Users are global and outlive the guild
        assert_eq!(stats.users, 2);

        assert!(cache.remove_guild(Snowflake::new(100)).is_none());
    }

    #[test]
    fn test_member_permissions() {
        let cache = seeded(CacheMode::Immutable);
        let guild = Snowflake::new(100);

        assert_eq!(
            cache.member_permissions(guild, Snowflake::new(1)).unwrap(),
            Permissions::ALL
        );
        let perms = cache.member_permissions(guild, Snowflake::new(2)).unwrap();
        assert!(perms.contains(Permissions::VIEW_CHANNEL | Permissions::MANAGE_MESSAGES));
        assert!(!perms.contains(Permissions::BAN_MEMBERS));

        assert!(cache
            .member_permissions(guild, Snowflake::new(99))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_channel_permissions_apply_overwrites() {
        let cache = seeded(CacheMode::Immutable);
        let mut channel = Channel::new_text(Snowflake::new(210), Snowflake::new(100), "staff");
        channel.permission_overwrites = vec![
            PermissionOverwrite {
                id: Snowflake::new(100),
                kind: 0,
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
            },
            PermissionOverwrite {
                id: Snowflake::new(300),
                kind: 0,
                allow: Permissions::VIEW_CHANNEL,
                deny: Permissions::empty(),
            },
        ];
        cache.upsert_entity(channel);

        let perms = cache
            .channel_permissions(Snowflake::new(210), Snowflake::new(2))
            .unwrap();
        assert!(perms.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_role_delete_strips_member_roles() {
        let cache = seeded(CacheMode::Immutable);
        cache.delete::<Role>(&(Snowflake::new(100), Snowflake::new(300)));
        let member = cache
            .member(Snowflake::new(100), Snowflake::new(2))
            .unwrap()
            .into_inner();
        assert!(member.roles.is_empty());
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert!(!guild.role_ids.contains(&Snowflake::new(300)));
    }

    #[test]
    fn test_member_join_and_leave_track_count() {
        let cache = seeded(CacheMode::Immutable);
        let member: Member = serde_json::from_str(
            r#"{"guild_id":"100","user":{"id":"3","username":"new"},"roles":[]}"#,
        )
        .unwrap();
        cache.member_joined(member);
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert_eq!(guild.member_count, Some(3));
        assert!(guild.member_ids.contains(&Snowflake::new(3)));

        assert!(cache.member_left(Snowflake::new(100), Snowflake::new(3)).is_some());
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert_eq!(guild.member_count, Some(2));
        assert!(!guild.member_ids.contains(&Snowflake::new(3)));
    }

    #[test]
    fn test_member_upsert_indexes_without_counting() {
        let cache = seeded(CacheMode::Immutable);
        // Already counted members seen again, plus one the index missed
        for raw in [
            r#"{"guild_id":"100","user":{"id":"1","username":"owner"},"roles":[]}"#,
            r#"{"guild_id":"100","user":{"id":"4","username":"lurker"},"roles":[]}"#,
        ] {
            cache.upsert::<Member>(raw.as_bytes()).unwrap();
        }
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert_eq!(guild.member_count, Some(2));
        assert_eq!(guild.member_ids.len(), 3);

        cache.delete::<Member>(&(Snowflake::new(100), Snowflake::new(4)));
        let guild = cache.guild(Snowflake::new(100)).unwrap().into_inner();
        assert_eq!(guild.member_count, Some(2));
    }

    #[test]
    fn test_current_user() {
        let cache = Cache::default();
        assert!(cache.current_user().is_none());
        cache.set_current_user(User::new(Snowflake::new(7), "bot"));
        assert_eq!(cache.current_user().unwrap().username, "bot");
        assert!(cache.user(Snowflake::new(7)).is_ok());
    }
}
