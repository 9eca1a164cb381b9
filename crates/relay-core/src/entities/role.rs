//! Role entity - a named permission set within a guild

use serde::{Deserialize, Serialize};

use super::{AnyEntity, Entity, EntityKind};
use crate::value_objects::{Permissions, Snowflake};

/// Role entity
///
/// The platform sends roles without their guild; `guild_id` is filled in by
/// the parent guild on detach or by the role event wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    #[serde(default)]
    pub guild_id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Role {
    /// Create a new role
    #[must_use]
    pub fn new(id: Snowflake, guild_id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check if this is the @everyone role (same ID as the guild)
    #[inline]
    #[must_use]
    pub fn is_everyone(&self) -> bool {
        self.id == self.guild_id
    }

    /// Mention string usable in message content
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@&{}>", self.id)
    }
}

impl Entity for Role {
    type Key = (Snowflake, Snowflake);

    const KIND: EntityKind = EntityKind::Role;

    fn key(&self) -> Self::Key {
        (self.guild_id, self.id)
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::Role(self)
    }
}
