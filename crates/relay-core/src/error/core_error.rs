//! Core errors - failures raised by entity operations

use thiserror::Error;

use super::ErrorKind;
use crate::entities::EntityKind;
use crate::value_objects::SnowflakeParseError;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot replicate {found} onto {expected}")]
    UnsupportedType {
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid snowflake: {0}")]
    InvalidSnowflake(#[from] SnowflakeParseError),
}

impl CoreError {
    /// Map the error onto the shared taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Self::Decode(_) | Self::InvalidSnowflake(_) => ErrorKind::Decode,
        }
    }
}

/// Result alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
