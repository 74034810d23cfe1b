//! Problem codes reported by the metadata diagnostic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single deficiency detected in a chain's published metadata.
///
/// The set is closed; the diagnostic returns them in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Problem {
    /// Metadata could not be fetched or decoded by a modern decoder.
    AncientMetadata,
    /// Metadata version is below 15.
    MissingModernMetadata,
    /// Metadata declares no runtime APIs.
    MissingRuntimeApis,
    /// Development-only runtime APIs (`TryRuntime`, `Benchmark`) are exposed.
    DevApisPresent,
    /// The `CheckMetadataHash` signed extension is not part of the extrinsic format.
    MissingCheckMetadataHashExtension,
    /// The v15 and v16 views of the metadata produce different Merkle digests.
    DifferentMetadataHashes,
    /// A transaction carrying the metadata hash was not accepted for broadcast.
    WrongOrMissingMetadataHash,
}

impl Problem {
    /// Every problem code, in detection order.
    pub const ALL: [Problem; 7] = [
        Problem::AncientMetadata,
        Problem::MissingModernMetadata,
        Problem::MissingRuntimeApis,
        Problem::DevApisPresent,
        Problem::DifferentMetadataHashes,
        Problem::MissingCheckMetadataHashExtension,
        Problem::WrongOrMissingMetadataHash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Problem::AncientMetadata => "ANCIENT_METADATA",
            Problem::MissingModernMetadata => "MISSING_MODERN_METADATA",
            Problem::MissingRuntimeApis => "MISSING_RUNTIME_APIS",
            Problem::DevApisPresent => "DEV_APIS_PRESENT",
            Problem::MissingCheckMetadataHashExtension => "MISSING_CHECK_METADATA_HASH_EXTENSION",
            Problem::DifferentMetadataHashes => "DIFFERENT_METADATA_HASHES",
            Problem::WrongOrMissingMetadataHash => "WRONG_OR_MISSING_METADATA_HASH",
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Problem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Problem::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown problem code: {}", s))
    }
}
