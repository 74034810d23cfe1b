//! Metadata codec seam.
//!
//! Decoding runtime metadata and building storage keys, constants, call data
//! and signed-extension payloads is delegated to a [`MetadataCodec`]
//! implementation. The client only needs the small summary in
//! [`RuntimeMetadata`].

use crate::error::Result;
use crate::signer::SignedExtensions;
use serde::{Deserialize, Serialize};

/// A runtime API declared in the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeApi {
    pub name: String,
    pub methods: Vec<String>,
}

/// What the diagnostic needs to know about decoded metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    pub version: u32,
    #[serde(default)]
    pub apis: Vec<RuntimeApi>,
    /// Identifiers of the transaction extensions, in signing order.
    #[serde(default)]
    pub signed_extensions: Vec<String>,
}

impl RuntimeMetadata {
    pub fn has_signed_extension(&self, identifier: &str) -> bool {
        self.signed_extensions.iter().any(|ext| ext == identifier)
    }

    pub fn api(&self, name: &str) -> Option<&RuntimeApi> {
        self.apis.iter().find(|api| api.name == name)
    }
}

/// Chain state the codec needs to fill in the standard signed extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionContext {
    pub nonce: u64,
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: Vec<u8>,
    pub block_hash: Vec<u8>,
    pub block_number: u32,
    pub tip: u128,
}

pub trait MetadataCodec: Send + Sync {
    /// Decode raw metadata bytes. Fails on anything unrecognized, which the
    /// diagnostic treats as ancient metadata.
    fn decode(&self, metadata: &[u8]) -> Result<RuntimeMetadata>;

    /// Full storage key for `pallet.entry` with the given already-encoded
    /// map keys.
    fn storage_key(&self, metadata: &[u8], pallet: &str, entry: &str, keys: &[&[u8]]) -> Result<Vec<u8>>;

    /// SCALE-encoded value of a pallet constant.
    fn constant(&self, metadata: &[u8], pallet: &str, name: &str) -> Result<Vec<u8>>;

    /// Encoded call: pallet and call indices followed by `args`.
    fn call_data(&self, metadata: &[u8], pallet: &str, call: &str, args: &[u8]) -> Result<Vec<u8>>;

    /// Values for every signed extension the metadata declares.
    fn signed_extensions(&self, metadata: &[u8], context: &ExtensionContext) -> Result<SignedExtensions>;
}
