//! Shard state and status snapshot

use serde::Serialize;
use std::time::Duration;

/// Lifecycle of a shard connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShardState {
    /// Created, not started
    Idle,
    /// Opening the socket and waiting for Hello
    Connecting,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// Session established, dispatches flowing
    Connected,
    /// Waiting out the backoff before the next attempt
    Reconnecting,
    /// Stopped by shutdown or a fatal close
    Disconnected,
}

impl ShardState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the shard will not connect again
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for ShardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time view of one shard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardInfo {
    pub id: u32,
    pub total: u32,
    pub state: ShardState,
    /// Last dispatch sequence processed
    pub sequence: u64,
    pub session_id: Option<String>,
    /// Round trip of the last acknowledged heartbeat
    pub latency: Option<Duration>,
    /// Guilds routed to this shard
    pub guilds: usize,
}
