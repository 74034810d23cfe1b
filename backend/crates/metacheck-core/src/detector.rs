//! The fixed sequence of metadata checks run against one session.

use crate::digester::MerkleizeInfo;
use crate::error::{DiagnosticError, Result};
use crate::session::{DiagnosticClient, Toolkit};
use crate::signer::{MetadataHashSigner, CHECK_METADATA_HASH};
use metacheck_commons::{Problem, TokenInfo};
use metacheck_link::RuntimeMetadata;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Runtime APIs that only belong in development builds.
pub const DEV_APIS: [&str; 2] = ["TryRuntime", "Benchmark"];

/// Lowest metadata version a generic client can work with.
pub const MODERN_METADATA_VERSION: u32 = 15;

pub const DEFAULT_TOKEN_SYMBOL: &str = "UNIT";
pub const DEFAULT_TOKEN_DECIMALS: u8 = 12;

const REMARK: &[u8] = b"metacheck: metadata hash check";

/// Metadata fetched at the finalized block.
struct LoadedMetadata {
    at: String,
    raw: Vec<u8>,
    decoded: RuntimeMetadata,
}

pub struct ProblemDetector<'a> {
    session: &'a DiagnosticClient,
    toolkit: &'a Toolkit,
    broadcast_timeout: Duration,
}

impl<'a> ProblemDetector<'a> {
    pub fn new(session: &'a DiagnosticClient, toolkit: &'a Toolkit, broadcast_timeout: Duration) -> Self {
        Self {
            session,
            toolkit,
            broadcast_timeout,
        }
    }

    /// Run every check and return the problems in detection order. The
    /// caller owns the session and destroys it afterwards.
    pub async fn run(&self, token: Option<&TokenInfo>) -> Vec<Problem> {
        let loaded = match self.load_metadata().await {
            Ok(loaded) => loaded,
            Err(e) => return vec![report(Problem::AncientMetadata, e)],
        };
        let metadata = &loaded.decoded;
        if metadata.version < MODERN_METADATA_VERSION {
            return vec![report(
                Problem::MissingModernMetadata,
                format!("metadata version {}", metadata.version),
            )];
        }

        let mut problems = Vec::new();
        if metadata.apis.is_empty() {
            problems.push(report(Problem::MissingRuntimeApis, "metadata declares no runtime APIs"));
        } else if let Some(api) = metadata
            .apis
            .iter()
            .find(|api| DEV_APIS.contains(&api.name.as_str()) && !api.methods.is_empty())
        {
            problems.push(report(
                Problem::DevApisPresent,
                format!("{} exposes {} methods", api.name, api.methods.len()),
            ));
        }

        let info = self.merkleize_info(token).await;
        let mut metadata_under_test = loaded.raw.clone();

        if metadata.version == 16 {
            match self.v15_view_if_digest_differs(&loaded, &info).await {
                Ok(Some(v15)) => {
                    problems.push(report(
                        Problem::DifferentMetadataHashes,
                        "v15 and v16 metadata digests differ, continuing with v15",
                    ));
                    metadata_under_test = v15;
                },
                Ok(None) => {},
                Err(e) => log::warn!("[metacheck-core] Skipping v15/v16 digest comparison: {}", e),
            }
        }

        if !metadata.has_signed_extension(CHECK_METADATA_HASH) {
            problems.push(report(
                Problem::MissingCheckMetadataHashExtension,
                format!("signed extensions are {:?}", metadata.signed_extensions),
            ));
        }

        match self.submit_remark(metadata_under_test, info).await {
            Ok(operation_id) => log::debug!("[metacheck-core] Check transaction broadcast as {}", operation_id),
            Err(e) => problems.push(report(Problem::WrongOrMissingMetadataHash, e)),
        }

        problems
    }

    async fn load_metadata(&self) -> Result<LoadedMetadata> {
        let client = &self.session.client;
        let at = client.finalized_block().await?;
        let raw = client.metadata(Some(&at)).await?;
        let decoded = self.toolkit.codec.decode(&raw)?;
        log::debug!(
            "[metacheck-core] Metadata v{} at {}: {} APIs, extensions {:?}",
            decoded.version,
            at,
            decoded.apis.len(),
            decoded.signed_extensions
        );
        Ok(LoadedMetadata { at, raw, decoded })
    }

    /// Caller values win; missing fields come from the chain spec, then
    /// from the defaults.
    async fn merkleize_info(&self, token: Option<&TokenInfo>) -> MerkleizeInfo {
        let mut symbol = token
            .and_then(|t| t.symbol.clone())
            .filter(|s| !s.is_empty());
        let mut decimals = token.and_then(|t| t.decimals);

        if symbol.is_none() || decimals.is_none() {
            match self.session.client.chain_spec_properties().await {
                Ok(properties) => {
                    symbol = symbol.or(properties.token_symbol);
                    decimals = decimals.or(properties.token_decimals);
                },
                Err(e) => log::warn!("[metacheck-core] Chain spec properties unavailable: {}", e),
            }
        }

        let info = MerkleizeInfo::new(
            symbol.unwrap_or_else(|| DEFAULT_TOKEN_SYMBOL.to_string()),
            decimals.unwrap_or(DEFAULT_TOKEN_DECIMALS),
        );
        log::debug!("[metacheck-core] Merkleizing with {:?}", info);
        info
    }

    /// `Some(v15 bytes)` when the v15 view digests differently from the
    /// metadata under test.
    async fn v15_view_if_digest_differs(
        &self,
        loaded: &LoadedMetadata,
        info: &MerkleizeInfo,
    ) -> Result<Option<Vec<u8>>> {
        let v15 = self
            .session
            .client
            .metadata_at_version(15, Some(&loaded.at))
            .await?
            .ok_or_else(|| DiagnosticError::Digest("runtime offers no v15 metadata".into()))?;

        let digester = &self.toolkit.digester;
        let digest15 = digester.digest(&v15, info)?;
        let digest16 = digester.digest(&loaded.raw, info)?;
        if digest15 == digest16 {
            return Ok(None);
        }
        log::debug!(
            "[metacheck-core] v15 digest 0x{} != v16 digest 0x{}",
            hex::encode(digest15),
            hex::encode(digest16)
        );
        Ok(Some(v15))
    }

    /// Sign and submit a remark committing to `metadata`, waiting only until
    /// it is broadcast.
    async fn submit_remark(&self, metadata: Vec<u8>, info: MerkleizeInfo) -> Result<String> {
        let api = &self.session.api;
        let transaction = api.remark(REMARK)?;
        let signer = MetadataHashSigner::new(
            Arc::clone(&self.toolkit.signer),
            Arc::clone(&self.toolkit.digester),
            info,
        )
        .with_custom_metadata(Some(metadata));

        api.sign_submit_and_watch(&transaction, Arc::new(signer))
            .until_broadcasted(self.broadcast_timeout)
            .await
            .map_err(|e| DiagnosticError::Submission(e.to_string()))
    }
}

fn report(problem: Problem, reason: impl Display) -> Problem {
    log::info!("[metacheck-core] {}: {}", problem, reason);
    problem
}
