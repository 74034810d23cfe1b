//! Metadata-aware chain API.
//!
//! Binds a [`ChainClient`] to a [`MetadataCodec`] and the metadata bytes of
//! the finalized block, and submits transactions built from them.

use crate::chain::ChainClient;
use crate::codec::{ExtensionContext, MetadataCodec, RuntimeMetadata};
use crate::error::{LinkError, Result};
use crate::scale;
use crate::signer::Signer;
use crate::tx::{TxEvent, TxWatch};
use metacheck_commons::rpc::from_hex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

const TX_EVENT_CHANNEL_CAPACITY: usize = 16;

/// An unsigned call ready to be signed and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    call_data: Vec<u8>,
}

impl Transaction {
    pub fn new(call_data: Vec<u8>) -> Self {
        Self { call_data }
    }

    pub fn call_data(&self) -> &[u8] {
        &self.call_data
    }
}

pub struct ChainApi {
    client: Arc<ChainClient>,
    codec: Arc<dyn MetadataCodec>,
    metadata: Vec<u8>,
    at: String,
}

impl ChainApi {
    /// Fetch the metadata of the current finalized block.
    pub async fn load(client: Arc<ChainClient>, codec: Arc<dyn MetadataCodec>) -> Result<Self> {
        let at = client.finalized_block().await?;
        let metadata = client.metadata(Some(&at)).await?;
        log::debug!("[metacheck-link] Loaded {} metadata bytes at {}", metadata.len(), at);
        Ok(Self {
            client,
            codec,
            metadata,
            at,
        })
    }

    pub fn client(&self) -> &Arc<ChainClient> {
        &self.client
    }

    /// Block the metadata was taken from.
    pub fn at(&self) -> &str {
        &self.at
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn runtime_metadata(&self) -> Result<RuntimeMetadata> {
        self.codec.decode(&self.metadata)
    }

    /// `System.Account` storage key for `account`.
    pub fn account_storage_key(&self, account: &[u8]) -> Result<Vec<u8>> {
        self.codec
            .storage_key(&self.metadata, "System", "Account", &[account])
    }

    pub fn constant_u128(&self, pallet: &str, name: &str) -> Result<u128> {
        let raw = self.codec.constant(&self.metadata, pallet, name)?;
        scale::decode_u128(&raw)
    }

    /// The runtime's `Metadata.metadata_at_version` view at [`at`](Self::at).
    pub async fn metadata_at_version(&self, version: u32) -> Result<Option<Vec<u8>>> {
        self.client.metadata_at_version(version, Some(&self.at)).await
    }

    /// `System.remark` carrying `remark`.
    pub fn remark(&self, remark: &[u8]) -> Result<Transaction> {
        let call_data = self.codec.call_data(
            &self.metadata,
            "System",
            "remark",
            &scale::encode_bytes(remark),
        )?;
        Ok(Transaction::new(call_data))
    }

    /// Sign `transaction` against the latest finalized block, validate and
    /// broadcast it, then keep reporting best blocks. Failures arrive as
    /// `Err` items on the watch.
    pub fn sign_submit_and_watch(&self, transaction: &Transaction, signer: Arc<dyn Signer>) -> TxWatch {
        let (events_tx, events_rx) = mpsc::channel(TX_EVENT_CHANNEL_CAPACITY);
        let job = SubmitJob {
            client: Arc::clone(&self.client),
            codec: Arc::clone(&self.codec),
            metadata: self.metadata.clone(),
            call_data: transaction.call_data.clone(),
            signer,
        };
        tokio::spawn(async move {
            if let Err(e) = job.run(&events_tx).await {
                log::debug!("[metacheck-link] Transaction failed: {}", e);
                let _ = events_tx.send(Err(e)).await;
            }
        });
        TxWatch::new(events_rx)
    }
}

struct SubmitJob {
    client: Arc<ChainClient>,
    codec: Arc<dyn MetadataCodec>,
    metadata: Vec<u8>,
    call_data: Vec<u8>,
    signer: Arc<dyn Signer>,
}

impl SubmitJob {
    async fn run(self, events: &mpsc::Sender<Result<TxEvent>>) -> Result<()> {
        let client = &self.client;
        let at = client.finalized_block().await?;
        let block_number = client.block_number(&at).await?;
        let nonce = client.account_nonce(&self.signer.public_key(), &at).await?;
        let version = client.runtime_version(Some(&at)).await?;
        let genesis_hash = from_hex(&client.genesis_hash().await?)?;

        let context = ExtensionContext {
            nonce,
            spec_version: version.spec_version,
            transaction_version: version.transaction_version,
            genesis_hash,
            block_hash: from_hex(&at)?,
            block_number,
            tip: 0,
        };
        let extensions = self.codec.signed_extensions(&self.metadata, &context)?;
        let extrinsic = self
            .signer
            .sign_tx(&self.call_data, &extensions, &self.metadata, block_number)
            .await?;

        if !emit(events, TxEvent::Signed { extrinsic: extrinsic.clone() }).await {
            return Ok(());
        }
        client.validate_transaction(&extrinsic, &at).await?;
        let operation_id = client.broadcast_transaction(&extrinsic).await?;
        if !emit(events, TxEvent::Broadcasted { operation_id }).await {
            return Ok(());
        }

        let mut follow = client.follow(false).await?;
        loop {
            tokio::select! {
                _ = events.closed() => break,
                event = follow.events.recv() => match event {
                    Some(event) => match event.get("event").and_then(Value::as_str) {
                        Some("bestBlockChanged") => {
                            let hash = event
                                .get("bestBlockHash")
                                .and_then(Value::as_str)
                                .ok_or_else(|| LinkError::Invalid("bestBlockChanged without hash".into()))?
                                .to_string();
                            if !emit(events, TxEvent::BestBlockChanged { hash }).await {
                                break;
                            }
                        },
                        Some("stop") => break,
                        _ => {},
                    },
                    None => break,
                },
            }
        }
        if let Err(e) = client.unfollow(&follow.id).await {
            log::debug!("[metacheck-link] Unfollow after watch failed: {}", e);
        }
        Ok(())
    }
}

async fn emit(events: &mpsc::Sender<Result<TxEvent>>, event: TxEvent) -> bool {
    events.send(Ok(event)).await.is_ok()
}
