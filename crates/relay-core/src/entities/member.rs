//! Member entity - a user's membership in a guild

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnyEntity, Entity, EntityKind, User};
use crate::value_objects::Snowflake;

/// Guild member entity
///
/// The embedded `user` is moved to the user cache on upsert; afterwards the
/// member refers to it through `user_id` only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub guild_id: Snowflake,
    #[serde(default)]
    pub user_id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_disabled_until: Option<DateTime<Utc>>,
}

impl Member {
    /// Create a new member
    #[must_use]
    pub fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            guild_id,
            user_id,
            ..Self::default()
        }
    }

    /// Resolve the member's user ID from the embedded user when not yet set
    pub fn resolve_user_id(&mut self) {
        if self.user_id.is_empty() {
            if let Some(user) = &self.user {
                self.user_id = user.id;
            }
        }
    }

    /// Check if member has a specific role
    #[inline]
    #[must_use]
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.roles.contains(&role_id)
    }

    /// Check if the member is timed out at `now`
    #[must_use]
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.communication_disabled_until
            .is_some_and(|until| until > now)
    }
}

impl Entity for Member {
    type Key = (Snowflake, Snowflake);

    const KIND: EntityKind = EntityKind::Member;

    fn key(&self) -> Self::Key {
        (self.guild_id, self.user_id)
    }

    fn detach(&mut self) -> Vec<AnyEntity> {
        self.resolve_user_id();
        match self.user.take() {
            Some(user) if !user.is_partial() => vec![AnyEntity::User(user)],
            _ => Vec::new(),
        }
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::Member(self)
    }
}
