//! Error types for metacheck-fork

use metacheck_live::LiveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForkError {
    #[error("Failed to launch worker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker exited before accepting connections ({0})")]
    Exited(String),

    #[error("Worker did not accept connections within {0:?}")]
    StartupTimeout(std::time::Duration),

    #[error("No free local port: {0}")]
    Port(std::io::Error),

    #[error("Failed to stage code override: {0}")]
    Override(std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Everything raised while bringing a worker up is a setup failure; failures
/// on an established socket are transport failures.
impl From<ForkError> for LiveError {
    fn from(err: ForkError) -> Self {
        match err {
            ForkError::WebSocket(msg) => LiveError::Transport(msg),
            other => LiveError::Setup(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForkError>;
