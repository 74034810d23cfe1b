//! Transaction signing seam.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One signed extension's contribution to a transaction: the `value` goes
/// into the extrinsic, `additional_signed` only into the signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedExtension {
    pub identifier: String,
    pub value: Vec<u8>,
    pub additional_signed: Vec<u8>,
}

impl SignedExtension {
    pub fn new(identifier: impl Into<String>, value: Vec<u8>, additional_signed: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            value,
            additional_signed,
        }
    }
}

/// Signed extensions keyed by identifier.
pub type SignedExtensions = BTreeMap<String, SignedExtension>;

/// Produces signed extrinsics for one account.
#[async_trait]
pub trait Signer: Send + Sync {
    fn public_key(&self) -> Vec<u8>;

    /// Build and sign an extrinsic for `call_data`, using exactly the given
    /// extensions.
    async fn sign_tx(
        &self,
        call_data: &[u8],
        extensions: &SignedExtensions,
        metadata: &[u8],
        at_block_number: u32,
    ) -> Result<Vec<u8>>;
}
