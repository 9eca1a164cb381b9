//! Guild entity - a server with channels, roles, members and voice states
//!
//! A decoded guild may embed its children. On upsert they are detached and
//! cached independently; the guild keeps only child ID indexes so no object is
//! stored twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{AnyEntity, Channel, Entity, EntityKind, Member, Presence, Role, VoiceState};
use crate::value_objects::Snowflake;

/// Guild entity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub afk_channel_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_channel_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_locale: Option<String>,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub large: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,

    // === Embedded children (present on create payloads) ===
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<Channel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Member>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voice_states: Vec<VoiceState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presences: Vec<Presence>,

    // === Child indexes (maintained by the cache) ===
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub channel_ids: BTreeSet<Snowflake>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub role_ids: BTreeSet<Snowflake>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub member_ids: BTreeSet<Snowflake>,
}

impl Guild {
    /// Create a new guild
    #[must_use]
    pub fn new(id: Snowflake, name: impl Into<String>, owner_id: Snowflake) -> Self {
        Self {
            id,
            name: name.into(),
            owner_id,
            ..Self::default()
        }
    }

    /// Check if user is the guild owner
    #[inline]
    #[must_use]
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owner_id == user_id
    }

    /// ID of the @everyone role (equal to the guild ID)
    #[inline]
    #[must_use]
    pub fn everyone_role_id(&self) -> Snowflake {
        self.id
    }

    /// Count a member join
    ///
    /// Only an actual join moves the count; members arriving through chunks,
    /// updates or REST lookups are already part of it.
    pub fn record_join(&mut self) {
        if let Some(count) = self.member_count.as_mut() {
            *count += 1;
        }
    }

    /// Count a member leave
    pub fn record_leave(&mut self) {
        if let Some(count) = self.member_count.as_mut() {
            *count = count.saturating_sub(1);
        }
    }
}

impl Entity for Guild {
    type Key = Snowflake;

    const KIND: EntityKind = EntityKind::Guild;

    fn key(&self) -> Snowflake {
        self.id
    }

    /// Copy the update onto the stored guild.
    ///
    /// Child indexes are merged rather than replaced: update payloads omit
    /// children, and child deletions remove their IDs explicitly. Fields only
    /// sent on create (`joined_at`, `member_count`, `large`) survive updates
    /// that lack them.
    fn replicate(&mut self, mut src: Self) {
        src.channel_ids.append(&mut self.channel_ids);
        src.role_ids.append(&mut self.role_ids);
        src.member_ids.append(&mut self.member_ids);
        if src.joined_at.is_none() {
            src.joined_at = self.joined_at;
        }
        if src.member_count.is_none() {
            src.member_count = self.member_count;
            src.large = self.large;
        }
        *self = src;
    }

    fn detach(&mut self) -> Vec<AnyEntity> {
        let guild_id = self.id;
        let mut detached = Vec::new();

        for mut channel in std::mem::take(&mut self.channels)
            .into_iter()
            .chain(std::mem::take(&mut self.threads))
        {
            channel.guild_id = Some(guild_id);
            self.channel_ids.insert(channel.id);
            detached.extend(channel.detach());
            detached.push(AnyEntity::Channel(channel));
        }

        for mut role in std::mem::take(&mut self.roles) {
            role.guild_id = guild_id;
            self.role_ids.insert(role.id);
            detached.push(AnyEntity::Role(role));
        }

        for mut member in std::mem::take(&mut self.members) {
            member.guild_id = guild_id;
            detached.extend(member.detach());
            self.member_ids.insert(member.user_id);
            detached.push(AnyEntity::Member(member));
        }

        for mut state in std::mem::take(&mut self.voice_states) {
            state.guild_id = guild_id;
            detached.extend(state.detach());
            detached.push(AnyEntity::VoiceState(state));
        }

        for mut presence in std::mem::take(&mut self.presences) {
            presence.guild_id = guild_id;
            detached.extend(presence.detach());
            detached.push(AnyEntity::Presence(presence));
        }

        detached
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::Guild(self)
    }
}
