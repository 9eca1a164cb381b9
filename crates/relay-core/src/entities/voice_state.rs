//! Voice state entity - one user session's voice connection in a guild

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnyEntity, Entity, EntityKind, Member};
use crate::value_objects::Snowflake;

/// Voice state entity
///
/// A user may hold several sessions at once (one per client), so identity is
/// the `(guild_id, user_id, session_id)` triple. A `channel_id` of `None`
/// means the session left voice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub guild_id: Snowflake,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
    #[serde(default)]
    pub self_stream: bool,
    #[serde(default)]
    pub self_video: bool,
    #[serde(default)]
    pub suppress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_to_speak_timestamp: Option<DateTime<Utc>>,
}

impl VoiceState {
    /// Create a voice state for a user session in a channel
    #[must_use]
    pub fn new(
        guild_id: Snowflake,
        user_id: Snowflake,
        session_id: impl Into<String>,
        channel_id: Option<Snowflake>,
    ) -> Self {
        Self {
            guild_id,
            channel_id,
            user_id,
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Check if this update means the session left voice
    #[inline]
    #[must_use]
    pub fn is_leave(&self) -> bool {
        self.channel_id.is_none_or(|id| id.is_empty())
    }

    /// Check if this state belongs to the same user session as `other`
    #[inline]
    #[must_use]
    pub fn same_session(&self, other: &VoiceState) -> bool {
        self.user_id == other.user_id && self.session_id == other.session_id
    }
}

impl Entity for VoiceState {
    type Key = (Snowflake, Snowflake, String);

    const KIND: EntityKind = EntityKind::VoiceState;

    fn key(&self) -> Self::Key {
        (self.guild_id, self.user_id, self.session_id.clone())
    }

    fn detach(&mut self) -> Vec<AnyEntity> {
        let Some(mut member) = self.member.take() else {
            return Vec::new();
        };
        if member.guild_id.is_empty() {
            member.guild_id = self.guild_id;
        }
        let mut detached = member.detach();
        detached.push(AnyEntity::Member(member));
        detached
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::VoiceState(self)
    }
}
