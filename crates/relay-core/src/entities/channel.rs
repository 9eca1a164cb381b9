//! Channel entity - guild text/voice channels, categories, threads and DMs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnyEntity, Entity, EntityKind, User};
use crate::value_objects::{Permissions, Snowflake};

/// Channel type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[repr(u8)]
pub enum ChannelType {
    #[default]
    GuildText = 0,
    Dm = 1,
    GuildVoice = 2,
    GroupDm = 3,
    GuildCategory = 4,
    GuildAnnouncement = 5,
    AnnouncementThread = 10,
    PublicThread = 11,
    PrivateThread = 12,
    GuildStageVoice = 13,
    GuildDirectory = 14,
    GuildForum = 15,
    GuildMedia = 16,
    /// Any type this client does not know yet
    Unknown = 255,
}

impl ChannelType {
    /// Get the numeric value
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a thread type
    #[inline]
    #[must_use]
    pub const fn is_thread(self) -> bool {
        matches!(
            self,
            Self::AnnouncementThread | Self::PublicThread | Self::PrivateThread
        )
    }

    /// Check if this is a private channel (DM or group DM)
    #[inline]
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::Dm | Self::GroupDm)
    }

    /// Check if users can connect to this channel for voice
    #[inline]
    #[must_use]
    pub const fn is_voice(self) -> bool {
        matches!(self, Self::GuildVoice | Self::GuildStageVoice)
    }
}

impl From<u8> for ChannelType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildAnnouncement,
            10 => Self::AnnouncementThread,
            11 => Self::PublicThread,
            12 => Self::PrivateThread,
            13 => Self::GuildStageVoice,
            14 => Self::GuildDirectory,
            15 => Self::GuildForum,
            16 => Self::GuildMedia,
            _ => Self::Unknown,
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(ct: ChannelType) -> Self {
        ct as u8
    }
}

/// Per-role or per-member permission overwrite on a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub id: Snowflake,
    /// 0 = role, 1 = member
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
}

impl PermissionOverwrite {
    #[inline]
    #[must_use]
    pub fn is_role(&self) -> bool {
        self.kind == 0
    }
}

/// Channel entity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type", default)]
    pub kind: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_user: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pin_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permission_overwrites: Vec<PermissionOverwrite>,
    /// Embedded DM recipients, moved to the user cache on upsert
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<User>,
    /// IDs of DM recipients, resolved through the user cache
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipient_ids: Vec<Snowflake>,
}

impl Channel {
    /// Create a guild text channel
    #[must_use]
    pub fn new_text(id: Snowflake, guild_id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: ChannelType::GuildText,
            guild_id: Some(guild_id),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Create a DM channel with the given recipients embedded
    #[must_use]
    pub fn new_dm(id: Snowflake, recipients: Vec<User>) -> Self {
        Self {
            id,
            kind: ChannelType::Dm,
            recipients,
            ..Self::default()
        }
    }

    /// Check if this is a guild channel
    #[inline]
    #[must_use]
    pub fn is_guild_channel(&self) -> bool {
        self.guild_id.is_some()
    }

    /// Get display name (channel name or fallback for DMs)
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Direct Message")
    }

    /// Mention string usable in message content
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

impl Entity for Channel {
    type Key = Snowflake;

    const KIND: EntityKind = EntityKind::Channel;

    fn key(&self) -> Snowflake {
        self.id
    }

    fn detach(&mut self) -> Vec<AnyEntity> {
        if self.recipients.is_empty() {
            return Vec::new();
        }
        let recipients = std::mem::take(&mut self.recipients);
        self.recipient_ids = recipients.iter().map(|u| u.id).collect();
        recipients.into_iter().map(AnyEntity::User).collect()
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::Channel(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_from_u8() {
        assert_eq!(ChannelType::from(0), ChannelType::GuildText);
        assert_eq!(ChannelType::from(1), ChannelType::Dm);
        assert_eq!(ChannelType::from(11), ChannelType::PublicThread);
        assert_eq!(ChannelType::from(99), ChannelType::Unknown);
        assert!(ChannelType::PrivateThread.is_thread());
        assert!(ChannelType::GroupDm.is_private());
        assert!(ChannelType::GuildStageVoice.is_voice());
    }

    #[test]
    fn test_channel_decode() {
        let channel: Channel = serde_json::from_str(
            r#"{"id":"41771983423143937","type":0,"guild_id":"41771983423143937","name":"general","position":6,"nsfw":true,"last_message_id":"155117677105512449","rate_limit_per_user":2,"parent_id":null}"#,
        )
        .unwrap();
        assert_eq!(channel.kind, ChannelType::GuildText);
        assert_eq!(channel.name.as_deref(), Some("general"));
        assert_eq!(channel.position, Some(6));
        assert!(channel.nsfw);
        assert!(channel.is_guild_channel());
        assert_eq!(channel.parent_id, None);
    }

    #[test]
    fn test_channel_type_serializes_as_number() {
        let channel = Channel::new_text(Snowflake::new(1), Snowflake::new(2), "x");
        let value = serde_json::to_value(&channel).unwrap();
        assert_eq!(value["type"], 0);
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn test_detach_moves_recipients() {
        let mut dm = Channel::new_dm(
            Snowflake::new(10),
            vec![User::new(Snowflake::new(1), "a"), User::new(Snowflake::new(2), "b")],
        );
        let detached = dm.detach();
        assert_eq!(detached.len(), 2);
        assert!(dm.recipients.is_empty());
        assert_eq!(dm.recipient_ids, vec![Snowflake::new(1), Snowflake::new(2)]);
        assert_eq!(dm.display_name(), "Direct Message");
    }

    #[test]
    fn test_detach_without_recipients_keeps_ids() {
        let mut channel = Channel::new_text(Snowflake::new(1), Snowflake::new(2), "general");
        assert!(channel.detach().is_empty());
        assert!(channel.recipient_ids.is_empty());
    }

    #[test]
    fn test_overwrite_decode() {
        let ow: PermissionOverwrite =
            serde_json::from_str(r#"{"id":"5","type":0,"allow":"1024","deny":"0"}"#).unwrap();
        assert!(ow.is_role());
        assert_eq!(ow.allow, Permissions::VIEW_CHANNEL);
    }
}
