//! Signer decorator attaching the `CheckMetadataHash` extension.

use crate::digester::{MerkleizeInfo, MetadataDigester};
use async_trait::async_trait;
use metacheck_link::{LinkError, Result, SignedExtension, SignedExtensions, Signer};
use std::sync::Arc;

pub const CHECK_METADATA_HASH: &str = "CheckMetadataHash";

/// Wraps a [`Signer`] so every transaction it signs commits to a metadata
/// digest. Only `sign_tx` differs from the inner signer.
///
/// The digest is taken over `custom_metadata` when set, otherwise over the
/// metadata the transaction is built with.
pub struct MetadataHashSigner {
    inner: Arc<dyn Signer>,
    digester: Arc<dyn MetadataDigester>,
    info: MerkleizeInfo,
    custom_metadata: Option<Vec<u8>>,
}

impl MetadataHashSigner {
    pub fn new(inner: Arc<dyn Signer>, digester: Arc<dyn MetadataDigester>, info: MerkleizeInfo) -> Self {
        Self {
            inner,
            digester,
            info,
            custom_metadata: None,
        }
    }

    pub fn with_custom_metadata(mut self, metadata: Option<Vec<u8>>) -> Self {
        self.custom_metadata = metadata;
        self
    }

    /// Extension payload: mode `1` (enabled) and `Some(digest)` as the
    /// additional signed data.
    pub fn extension(&self, metadata: &[u8]) -> Result<SignedExtension> {
        let source = self.custom_metadata.as_deref().unwrap_or(metadata);
        let digest = self
            .digester
            .digest(source, &self.info)
            .map_err(|e| LinkError::Signer(e.to_string()))?;

        let mut additional_signed = Vec::with_capacity(33);
        additional_signed.push(1);
        additional_signed.extend_from_slice(&digest);
        Ok(SignedExtension::new(CHECK_METADATA_HASH, vec![1], additional_signed))
    }
}

#[async_trait]
impl Signer for MetadataHashSigner {
    fn public_key(&self) -> Vec<u8> {
        self.inner.public_key()
    }

    async fn sign_tx(
        &self,
        call_data: &[u8],
        extensions: &SignedExtensions,
        metadata: &[u8],
        at_block_number: u32,
    ) -> Result<Vec<u8>> {
        let mut extensions = extensions.clone();
        extensions.insert(CHECK_METADATA_HASH.to_string(), self.extension(metadata)?);
        self.inner
            .sign_tx(call_data, &extensions, metadata, at_block_number)
            .await
    }
}
