//! Error types for metacheck-live

use metacheck_commons::{ConnectionId, RpcError};
use thiserror::Error;

/// Errors raised by the multiplexer and by simulation handles
#[derive(Error, Debug, Clone)]
pub enum LiveError {
    #[error("Simulation setup failed: {0}")]
    Setup(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Simulation rejected request: {0}")]
    Rpc(RpcError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Simulation handle is closed")]
    Closed,
}

impl LiveError {
    /// JSON-RPC error object to hand back to a consumer.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            LiveError::Rpc(error) => error.clone(),
            other => RpcError::internal(other.to_string()),
        }
    }
}

/// Result type for multiplexer operations
pub type Result<T> = std::result::Result<T, LiveError>;
