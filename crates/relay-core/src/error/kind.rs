//! Error taxonomy shared by every relay crate
//!
//! Each crate keeps its own `thiserror` enum and maps it onto one of these
//! kinds through a `kind()` method, so callers can branch on the category
//! without matching every concrete variant.

use std::fmt;

/// Category of a runtime failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket or HTTP transport failure (retryable)
    Transport,
    /// Credentials rejected by the server (fatal for the shard)
    Auth,
    /// Payload could not be decoded
    Decode,
    /// Rate-limit retries exhausted, or waiting was refused
    RateLimitExceeded,
    /// Entity absent from the cache
    NotFoundInCache,
    /// Operation applied to the wrong entity type
    UnsupportedType,
    /// Caller deadline elapsed before the operation could run
    Timeout,
    /// Server answered with a non-success status
    Rejected,
    /// Component already shut down
    Closed,
}

impl ErrorKind {
    /// Get the constant name of the kind
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Auth => "AUTH",
            Self::Decode => "DECODE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::NotFoundInCache => "NOT_FOUND_IN_CACHE",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::Timeout => "TIMEOUT",
            Self::Rejected => "REJECTED",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether an operation failing with this kind may succeed when retried
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Timeout | Self::RateLimitExceeded)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
