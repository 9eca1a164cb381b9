//! Client errors

use relay_cache::CacheError;
use relay_common::ConfigError;
use relay_core::{CoreError, ErrorKind};
use relay_gateway::GatewayError;
use relay_http::HttpError;
use thiserror::Error;

/// Any failure surfaced by the client facade
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Gateway commands need `connect` first
    #[error("client is not connected")]
    NotConnected,

    #[error("client is already connected")]
    AlreadyConnected,
}

impl ClientError {
    /// Map the error onto the shared taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::AlreadyConnected => ErrorKind::Rejected,
            Self::Core(e) => e.kind(),
            Self::Cache(e) => e.kind(),
            Self::Http(e) => e.kind(),
            Self::Gateway(e) => e.kind(),
            Self::NotConnected => ErrorKind::Closed,
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
