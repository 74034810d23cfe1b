//! Merkle metadata digest seam.

use crate::error::Result;

/// Chain-specific inputs of the metadata digest besides the metadata itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleizeInfo {
    pub decimals: u8,
    pub token_symbol: String,
}

impl MerkleizeInfo {
    pub fn new(token_symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            decimals,
            token_symbol: token_symbol.into(),
        }
    }
}

/// Computes the 32-byte metadata digest committed to by `CheckMetadataHash`.
pub trait MetadataDigester: Send + Sync {
    fn digest(&self, metadata: &[u8], info: &MerkleizeInfo) -> Result<[u8; 32]>;
}
