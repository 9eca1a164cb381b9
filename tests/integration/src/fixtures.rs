//! Gateway payload fixtures

use serde_json::{json, Value};

pub const BOT_ID: u64 = 900;
pub const SESSION_ID: &str = "session-abc";
pub const RESUME_URL: &str = "wss://resume.gateway.test";

/// READY for a shard, listing the given guilds as unavailable
pub fn ready(shard: [u32; 2], guild_ids: &[u64]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({ "id": id.to_string(), "unavailable": true }))
        .collect();
    json!({
        "v": 10,
        "user": user(BOT_ID, "relay-bot"),
        "guilds": guilds,
        "session_id": SESSION_ID,
        "resume_gateway_url": RESUME_URL,
        "shard": shard,
    })
}

pub fn user(id: u64, username: &str) -> Value {
    json!({ "id": id.to_string(), "username": username })
}

/// Guild text channel
pub fn text_channel(id: u64, guild_id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "type": 0,
        "guild_id": guild_id.to_string(),
        "name": name,
    })
}

/// Guild voice channel
pub fn voice_channel(id: u64, guild_id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "type": 2,
        "guild_id": guild_id.to_string(),
        "name": name,
    })
}

/// Available guild with one member (the owner) and the given channels
pub fn guild(id: u64, name: &str, owner_id: u64, channels: Vec<Value>) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "owner_id": owner_id.to_string(),
        "channels": channels,
        "roles": [],
        "members": [
            { "user": user(owner_id, "owner"), "roles": [] }
        ],
        "voice_states": [],
    })
}

/// Voice state; `channel_id: None` is a leave
pub fn voice_state(guild_id: u64, user_id: u64, session_id: &str, channel_id: Option<u64>) -> Value {
    json!({
        "guild_id": guild_id.to_string(),
        "channel_id": channel_id.map(|id| id.to_string()),
        "user_id": user_id.to_string(),
        "session_id": session_id,
    })
}
