//! User entity - a platform account

use serde::{Deserialize, Serialize};

use super::{AnyEntity, Entity, EntityKind};
use crate::value_objects::Snowflake;

/// User entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_flags: Option<u64>,
}

impl User {
    /// Create a user with just an ID and name
    #[must_use]
    pub fn new(id: Snowflake, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            ..Self::default()
        }
    }

    /// Whether this value carries more than an ID
    ///
    /// Presence updates embed `{"id": ...}` only; such partial users must not
    /// overwrite a complete cached user.
    #[inline]
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.username.is_empty()
    }

    /// Get the name to show (global display name, then username)
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Mention string usable in message content
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

impl Entity for User {
    type Key = Snowflake;

    const KIND: EntityKind = EntityKind::User;

    fn key(&self) -> Snowflake {
        self.id
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::User(self)
    }
}
