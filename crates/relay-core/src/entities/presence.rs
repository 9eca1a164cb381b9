//! Presence entity - a user's status and activities within a guild

use serde::{Deserialize, Serialize};

use super::{AnyEntity, Entity, EntityKind, User};
use crate::value_objects::Snowflake;

/// Online status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Idle,
    Dnd,
    Invisible,
    #[default]
    Offline,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Invisible => "invisible",
            Self::Offline => "offline",
        }
    }
}

/// An activity shown under a user's name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Per-platform status breakdown
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<Status>,
}

/// Presence entity keyed by `(guild_id, user_id)`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presence {
    #[serde(default)]
    pub guild_id: Snowflake,
    #[serde(default)]
    pub user_id: Snowflake,
    /// Embedded user (often partial), moved out on upsert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub client_status: ClientStatus,
}

impl Entity for Presence {
    type Key = (Snowflake, Snowflake);

    const KIND: EntityKind = EntityKind::Presence;

    fn key(&self) -> Self::Key {
        (self.guild_id, self.user_id)
    }

    fn detach(&mut self) -> Vec<AnyEntity> {
        let Some(user) = self.user.take() else {
            return Vec::new();
        };
        self.user_id = user.id;
        if user.is_partial() {
            Vec::new()
        } else {
            vec![AnyEntity::User(user)]
        }
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::Presence(self)
    }
}
