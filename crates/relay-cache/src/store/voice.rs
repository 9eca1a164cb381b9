//! Per-guild voice state sets
//!
//! Sessions are unique by `(user_id, session_id)`. An update with no channel
//! removes exactly the matching session, an update for a known session moves
//! it in place, and an update for an unknown session appends it.

use parking_lot::RwLock;
use relay_common::CacheMode;
use relay_core::{Entity, Snowflake, VoiceState};
use std::collections::HashMap;
use std::sync::Arc;

use super::Cached;

/// Outcome of applying a voice state update
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceUpdate {
    /// New session connected to a channel
    Joined(VoiceState),
    /// Known session changed channel or flags
    Moved {
        from: Option<Snowflake>,
        state: VoiceState,
    },
    /// Session disconnected; holds the removed state
    Left(VoiceState),
    /// Leave for a session that was not tracked, or a state with no guild
    Ignored,
}

impl VoiceUpdate {
    /// The state after the update (or the removed state for a leave)
    #[must_use]
    pub fn state(&self) -> Option<&VoiceState> {
        match self {
            Self::Joined(state) | Self::Left(state) | Self::Moved { state, .. } => Some(state),
            Self::Ignored => None,
        }
    }
}

/// Voice sessions of one guild
#[derive(Debug, Default)]
pub struct VoiceStateSet {
    sessions: Vec<Arc<RwLock<VoiceState>>>,
}

impl VoiceStateSet {
    fn position(&self, state: &VoiceState) -> Option<usize> {
        self.sessions
            .iter()
            .position(|stored| stored.read().same_session(state))
    }

    /// Apply a join, move or leave
    pub fn apply(&mut self, state: VoiceState) -> VoiceUpdate {
        let existing = self.position(&state);

        if state.is_leave() {
            return match existing {
                Some(index) => {
                    let removed = self.sessions.swap_remove(index);
                    let removed = removed.read().snapshot();
                    VoiceUpdate::Left(removed)
                }
                None => VoiceUpdate::Ignored,
            };
        }

        match existing {
            Some(index) => {
                let mut stored = self.sessions[index].write();
                let from = stored.channel_id;
                stored.replicate(state);
                VoiceUpdate::Moved {
                    from,
                    state: stored.snapshot(),
                }
            }
            None => {
                let joined = state.snapshot();
                self.sessions.push(Arc::new(RwLock::new(state)));
                VoiceUpdate::Joined(joined)
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Voice state sets for every guild
#[derive(Debug)]
pub struct VoiceStateStore {
    mode: CacheMode,
    guilds: RwLock<HashMap<Snowflake, VoiceStateSet>>,
}

impl VoiceStateStore {
    #[must_use]
    pub fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            guilds: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a voice state update to its guild's set
    pub fn apply(&self, state: VoiceState) -> VoiceUpdate {
        if state.guild_id.is_empty() {
            return VoiceUpdate::Ignored;
        }
        let guild_id = state.guild_id;
        let mut guilds = self.guilds.write();
        let set = guilds.entry(guild_id).or_default();
        let update = set.apply(state);
        if set.is_empty() {
            guilds.remove(&guild_id);
        }
        update
    }

    fn hand_out(&self, shared: &Arc<RwLock<VoiceState>>) -> Cached<VoiceState> {
        match self.mode {
            CacheMode::Mutable => Cached::Live(Arc::clone(shared)),
            CacheMode::Immutable => Cached::Snapshot(shared.read().snapshot()),
        }
    }

    /// All sessions in a guild
    #[must_use]
    pub fn guild(&self, guild_id: Snowflake) -> Vec<Cached<VoiceState>> {
        self.guilds
            .read()
            .get(&guild_id)
            .map(|set| set.sessions.iter().map(|s| self.hand_out(s)).collect())
            .unwrap_or_default()
    }

    /// All sessions a user holds in a guild
    #[must_use]
    pub fn user(&self, guild_id: Snowflake, user_id: Snowflake) -> Vec<Cached<VoiceState>> {
        self.guilds
            .read()
            .get(&guild_id)
            .map(|set| {
                set.sessions
                    .iter()
                    .filter(|s| s.read().user_id == user_id)
                    .map(|s| self.hand_out(s))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Users connected to a voice channel
    #[must_use]
    pub fn channel_users(&self, guild_id: Snowflake, channel_id: Snowflake) -> Vec<Snowflake> {
        self.guilds
            .read()
            .get(&guild_id)
            .map(|set| {
                set.sessions
                    .iter()
                    .filter_map(|s| {
                        let state = s.read();
                        (state.channel_id == Some(channel_id)).then_some(state.user_id)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a guild's set; returns how many sessions were removed
    pub fn remove_guild(&self, guild_id: Snowflake) -> usize {
        self.guilds
            .write()
            .remove(&guild_id)
            .map_or(0, |set| set.len())
    }

    pub fn clear(&self) {
        self.guilds.write().clear();
    }

    /// Total tracked sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.guilds.read().values().map(VoiceStateSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
