//! # metacheck-core
//!
//! The metadata diagnostic. [`Diagnostics::get_problems`] forks a chain,
//! funds a test account on the fork, inspects the runtime metadata and
//! submits a transaction carrying the `CheckMetadataHash` extension, then
//! reports every [`Problem`](metacheck_commons::Problem) it found.
//!
//! Metadata decoding, the Merkle digest and signing are supplied by the
//! caller through a [`Toolkit`].

pub mod detector;
pub mod diagnostics;
pub mod digester;
pub mod error;
pub mod logging;
pub mod session;
pub mod signer;

pub use detector::ProblemDetector;
pub use diagnostics::Diagnostics;
pub use digester::{MerkleizeInfo, MetadataDigester};
pub use error::{DiagnosticError, Result};
pub use session::{DiagnosticClient, Toolkit};
pub use signer::{MetadataHashSigner, CHECK_METADATA_HASH};
