//! # relay-core
//!
//! Domain layer: snowflake IDs, permissions, the cacheable entities with their
//! copy contract, gateway event payloads and the shared error taxonomy.
//! This crate has no runtime or I/O dependencies.

pub mod entities;
pub mod error;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Activity, AnyEntity, Channel, ChannelType, ClientStatus, Entity, EntityKind, Guild, Member,
    PermissionOverwrite, Presence, Role, Status, User, VoiceState,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use events::{
    GatewayEventType, GuildMemberRemoveEvent, GuildMembersChunkEvent, GuildRoleDeleteEvent,
    GuildRoleEvent, ReadyEvent, UnavailableGuild,
};
pub use value_objects::{Permissions, Snowflake, SnowflakeParseError};
