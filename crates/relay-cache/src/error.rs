//! Cache errors

use relay_core::{CoreError, EntityKind, ErrorKind};
use thiserror::Error;

/// Cache operation errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{kind} not found in cache: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CacheError {
    /// Build a not-found error for an entity key
    pub fn not_found(kind: EntityKind, key: &impl std::fmt::Debug) -> Self {
        Self::NotFound {
            kind,
            key: format!("{key:?}"),
        }
    }

    /// Map the error onto the shared taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFoundInCache,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Core(e) => e.kind(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
