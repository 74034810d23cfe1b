//! Error types for metacheck-core

use metacheck_link::LinkError;
use thiserror::Error;

/// Errors raised while preparing or running a diagnostic.
///
/// None of these escape [`Diagnostics::get_problems`](crate::Diagnostics::get_problems);
/// they decide which problem gets reported and are logged.
#[derive(Error, Debug)]
pub enum DiagnosticError {
    #[error("Session setup failed: {0}")]
    Session(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Metadata digest failed: {0}")]
    Digest(String),

    #[error("Transaction submission failed: {0}")]
    Submission(String),
}

/// Result type for diagnostic operations
pub type Result<T> = std::result::Result<T, DiagnosticError>;
