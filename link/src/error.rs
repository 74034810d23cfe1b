//! Error types for metacheck-link

use metacheck_commons::RpcError;
use metacheck_live::LiveError;
use thiserror::Error;

/// Errors that can occur in chain client operations
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    #[error("RPC error: {0}")]
    Rpc(RpcError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Metadata codec error: {0}")]
    Codec(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Invalid response: {0}")]
    Invalid(String),

    #[error("Client is closed")]
    Closed,

    #[error(transparent)]
    Live(LiveError),
}

impl From<LiveError> for LinkError {
    fn from(err: LiveError) -> Self {
        match err {
            LiveError::Rpc(error) => LinkError::Rpc(error),
            LiveError::Closed | LiveError::ConnectionClosed(_) => LinkError::Closed,
            other => LinkError::Live(other),
        }
    }
}

impl From<hex::FromHexError> for LinkError {
    fn from(err: hex::FromHexError) -> Self {
        LinkError::Decode(format!("invalid hex: {}", err))
    }
}

/// Result type for chain client operations
pub type Result<T> = std::result::Result<T, LinkError>;
