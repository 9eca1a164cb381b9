//! Entity stores

mod entity_cache;
mod voice;

pub use entity_cache::{Cached, EntityCache};
pub use voice::{VoiceStateSet, VoiceStateStore, VoiceUpdate};
