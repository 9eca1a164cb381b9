//! Gateway errors

use relay_core::ErrorKind;
use thiserror::Error;

use crate::protocol::CloseCode;

/// Failure of the socket underneath a shard
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer closed the connection, with its close code when one was sent
    #[error("connection closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// Opening the connection did not finish in time
    #[error("connect timed out")]
    ConnectTimeout,

    /// I/O or WebSocket protocol failure
    #[error("socket error: {0}")]
    Socket(String),

    /// Read or write on a transport that was never opened
    #[error("transport is not open")]
    NotOpen,
}

impl TransportError {
    #[must_use]
    pub fn closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }

    /// Gateway close code carried by a close, if it is one
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Closed { code: Some(code), .. } => CloseCode::from_u16(*code),
            _ => None,
        }
    }
}

/// Gateway error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server closed the shard with a code that forbids reconnecting
    #[error("shard {shard_id} closed: {code}")]
    FatalClose { shard_id: u32, code: CloseCode },

    /// Frame arrived out of protocol order
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// No shard with this ID is managed
    #[error("unknown shard {0}")]
    UnknownShard(u32),

    /// The shard or manager was shut down
    #[error("shard is shut down")]
    Closed,

    /// Shard count or gateway URL could not be resolved
    #[error("gateway setup failed: {0}")]
    Setup(String),
}

impl GatewayError {
    /// Map the error onto the shared taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(TransportError::ConnectTimeout) => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Transport,
            Self::FatalClose { code, .. } if code.is_auth_failure() => ErrorKind::Auth,
            Self::FatalClose { .. } | Self::Setup(_) => ErrorKind::Rejected,
            Self::Protocol(_) | Self::Decode(_) => ErrorKind::Decode,
            Self::UnknownShard(_) => ErrorKind::UnsupportedType,
            Self::Closed => ErrorKind::Closed,
        }
    }

    /// Check if the shard stopped for good
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalClose { .. } | Self::Closed)
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
