//! Gateway dispatch events

mod event_types;
mod payloads;

pub use event_types::GatewayEventType;
pub use payloads::{
    GuildMemberRemoveEvent, GuildMembersChunkEvent, GuildRoleDeleteEvent, GuildRoleEvent,
    ReadyEvent, UnavailableGuild,
};
