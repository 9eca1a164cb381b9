//! Cacheable entities and the copy contract they share

mod channel;
mod entity;
mod guild;
mod member;
mod presence;
mod role;
mod user;
mod voice_state;

pub use channel::{Channel, ChannelType, PermissionOverwrite};
pub use entity::{AnyEntity, Entity, EntityKind};
pub use guild::Guild;
pub use member::Member;
pub use presence::{Activity, ClientStatus, Presence, Status};
pub use role::Role;
pub use user::User;
pub use voice_state::VoiceState;
