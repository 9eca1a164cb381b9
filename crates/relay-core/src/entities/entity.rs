//! Entity contract - the copy semantics every cacheable type provides
//!
//! The cache never knows concrete field layouts. It relies on three
//! operations:
//!
//! - [`Entity::replicate`] copies a freshly decoded value over a stored one in
//!   place, so every holder of a live handle observes the update.
//! - [`Entity::snapshot`] produces a deep copy sharing nothing with the store.
//! - [`Entity::detach`] moves embedded child entities out of a decoded value so
//!   they can be cached under their own keys, leaving only IDs behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;

use super::{Channel, Guild, Member, Presence, Role, User, VoiceState};
use crate::error::CoreError;

/// Discriminant for the cacheable entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Channel,
    Guild,
    User,
    Member,
    Role,
    VoiceState,
    Presence,
}

impl EntityKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Channel => "Channel",
            Self::Guild => "Guild",
            Self::User => "User",
            Self::Member => "Member",
            Self::Role => "Role",
            Self::VoiceState => "VoiceState",
            Self::Presence => "Presence",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value the cache can store, copy over and snapshot
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity of the entity inside its store
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Which store the entity belongs to
    const KIND: EntityKind;

    /// Get the identity of this value
    fn key(&self) -> Self::Key;

    /// Copy every field of `src` onto `self`
    fn replicate(&mut self, src: Self) {
        *self = src;
    }

    /// Deep copy breaking all aliasing with `self`
    #[must_use]
    fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Move embedded child entities out, leaving their IDs behind
    fn detach(&mut self) -> Vec<AnyEntity> {
        Vec::new()
    }

    /// Wrap into the closed entity sum
    fn into_any(self) -> AnyEntity;
}

/// Closed sum of every cacheable entity
#[derive(Debug, Clone, PartialEq)]
pub enum AnyEntity {
    Channel(Channel),
    Guild(Guild),
    User(User),
    Member(Member),
    Role(Role),
    VoiceState(VoiceState),
    Presence(Presence),
}

impl AnyEntity {
    /// Get the kind of the wrapped entity
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Channel(_) => EntityKind::Channel,
            Self::Guild(_) => EntityKind::Guild,
            Self::User(_) => EntityKind::User,
            Self::Member(_) => EntityKind::Member,
            Self::Role(_) => EntityKind::Role,
            Self::VoiceState(_) => EntityKind::VoiceState,
            Self::Presence(_) => EntityKind::Presence,
        }
    }

    /// Copy `src` onto `self`; both must wrap the same entity type
    pub fn replicate(&mut self, src: AnyEntity) -> Result<(), CoreError> {
        match (self, src) {
            (Self::Channel(dst), Self::Channel(src)) => dst.replicate(src),
            (Self::Guild(dst), Self::Guild(src)) => dst.replicate(src),
            (Self::User(dst), Self::User(src)) => dst.replicate(src),
            (Self::Member(dst), Self::Member(src)) => dst.replicate(src),
            (Self::Role(dst), Self::Role(src)) => dst.replicate(src),
            (Self::VoiceState(dst), Self::VoiceState(src)) => dst.replicate(src),
            (Self::Presence(dst), Self::Presence(src)) => dst.replicate(src),
            (dst, src) => {
                return Err(CoreError::UnsupportedType {
                    expected: dst.kind(),
                    found: src.kind(),
                })
            }
        }
        Ok(())
    }

    /// Deep copy of the wrapped entity
    #[must_use]
    pub fn snapshot(&self) -> Self {
        match self {
            Self::Channel(e) => Self::Channel(e.snapshot()),
            Self::Guild(e) => Self::Guild(e.snapshot()),
            Self::User(e) => Self::User(e.snapshot()),
            Self::Member(e) => Self::Member(e.snapshot()),
            Self::Role(e) => Self::Role(e.snapshot()),
            Self::VoiceState(e) => Self::VoiceState(e.snapshot()),
            Self::Presence(e) => Self::Presence(e.snapshot()),
        }
    }

    /// Serialize the wrapped entity to JSON
    pub fn to_value(&self) -> Result<serde_json::Value, CoreError> {
        let value = match self {
            Self::Channel(e) => serde_json::to_value(e),
            Self::Guild(e) => serde_json::to_value(e),
            Self::User(e) => serde_json::to_value(e),
            Self::Member(e) => serde_json::to_value(e),
            Self::Role(e) => serde_json::to_value(e),
            Self::VoiceState(e) => serde_json::to_value(e),
            Self::Presence(e) => serde_json::to_value(e),
        }?;
        Ok(value)
    }

    #[must_use]
    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_guild(&self) -> Option<&Guild> {
        match self {
            Self::Guild(g) => Some(g),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_member(&self) -> Option<&Member> {
        match self {
            Self::Member(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_role(&self) -> Option<&Role> {
        match self {
            Self::Role(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_voice_state(&self) -> Option<&VoiceState> {
        match self {
            Self::VoiceState(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_presence(&self) -> Option<&Presence> {
        match self {
            Self::Presence(p) => Some(p),
            _ => None,
        }
    }
}
