//! Fake forked chain and toolkit for diagnostic tests.
//!
//! Metadata on this chain is the JSON form of [`RuntimeMetadata`], so the
//! fake codec decodes it with serde. The digest ignores the `version`
//! field, which makes consistent v15/v16 views digest alike. A transaction
//! is valid when its `CheckMetadataHash` payload matches the digest the
//! chain expects.

#![allow(dead_code)]

use async_trait::async_trait;
use metacheck_commons::rpc::{from_hex, to_hex};
use metacheck_commons::{ForkParams, RpcError};
use metacheck_core::{DiagnosticError, MerkleizeInfo, MetadataDigester, Toolkit, CHECK_METADATA_HASH};
use metacheck_link::scale::{Compact, Decode, Encode};
use metacheck_link::{
    ExtensionContext, LinkError, MetadataCodec, RuntimeApi, RuntimeMetadata, SignedExtension,
    SignedExtensions, Signer,
};
use metacheck_live::{LiveError, NativeSubscription, Result, SimulationEngine, SimulationHandle};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const GENESIS_HASH: &str = "0x9100000000000000000000000000000000000000000000000000000000000091";
pub const EXISTENTIAL_DEPOSIT: u128 = 10_000_000_000;
pub const ALICE: [u8; 32] = [0xd4; 32];

pub fn block_hash(number: u32) -> String {
    format!("0x{:064x}", number)
}

pub fn metadata(version: u32, apis: &[(&str, usize)], extensions: &[&str]) -> RuntimeMetadata {
    RuntimeMetadata {
        version,
        apis: apis
            .iter()
            .map(|(name, methods)| RuntimeApi {
                name: name.to_string(),
                methods: (0..*methods).map(|i| format!("method_{}", i)).collect(),
            })
            .collect(),
        signed_extensions: extensions.iter().map(|e| e.to_string()).collect(),
    }
}

pub fn modern(version: u32) -> RuntimeMetadata {
    metadata(
        version,
        &[("Core", 3), ("Metadata", 3)],
        &["CheckNonce", "CheckMortality", CHECK_METADATA_HASH],
    )
}

pub fn encode_metadata(metadata: &RuntimeMetadata) -> Vec<u8> {
    serde_json::to_vec(metadata).unwrap()
}

/// Knobs and recordings shared by the engine and its handles.
#[derive(Default)]
pub struct ChainState {
    /// `None` makes `Metadata_metadata_versions` fail like an old runtime.
    pub metadata_versions: Mutex<Option<Vec<u32>>>,
    pub versioned_metadata: Mutex<HashMap<u32, Vec<u8>>>,
    /// Verbatim `Metadata_metadata_at_version` replies, bypassing encoding.
    pub raw_metadata_at_version: Mutex<HashMap<u32, Vec<u8>>>,
    pub legacy_metadata: Mutex<Vec<u8>>,
    /// `CheckMetadataHash` payload the runtime accepts. `None` accepts any
    /// transaction that carries one.
    pub expected_hash: Mutex<Option<Vec<u8>>>,
    pub properties: Mutex<Value>,
    pub fail_setup: Mutex<bool>,
    pub best_block: Mutex<u32>,
    pub storage_writes: Mutex<Vec<Value>>,
    pub methods: Mutex<Vec<String>>,
    pub setups: AtomicUsize,
    pub closes: AtomicUsize,
    pub releases: AtomicUsize,
    senders: Mutex<HashMap<String, mpsc::Sender<Result<Value>>>>,
}

impl ChainState {
    pub fn calls(&self, method: &str) -> usize {
        self.methods.lock().iter().filter(|m| *m == method).count()
    }

    /// A chain exposing metadata v14 only through `state_getMetadata`.
    pub fn legacy(&self, metadata: &RuntimeMetadata) {
        *self.metadata_versions.lock() = None;
        *self.legacy_metadata.lock() = encode_metadata(metadata);
    }

    /// A chain exposing the given versions through the metadata runtime API.
    pub fn versioned(&self, views: &[&RuntimeMetadata]) {
        *self.metadata_versions.lock() = Some(views.iter().map(|m| m.version).collect());
        let mut versioned = self.versioned_metadata.lock();
        for view in views {
            versioned.insert(view.version, encode_metadata(view));
        }
    }
}

pub struct FakeEngine {
    pub state: Arc<ChainState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let state = ChainState::default();
        *state.best_block.lock() = 41;
        *state.properties.lock() = json!({"tokenSymbol": "DOT", "tokenDecimals": 10});
        Self {
            state: Arc::new(state),
        }
    }
}

#[async_trait]
impl SimulationEngine for FakeEngine {
    async fn setup(&self, _params: &ForkParams) -> Result<Arc<dyn SimulationHandle>> {
        self.state.setups.fetch_add(1, Ordering::SeqCst);
        if *self.state.fail_setup.lock() {
            return Err(LiveError::Setup("upstream unreachable".into()));
        }
        Ok(Arc::new(FakeHandle {
            state: Arc::clone(&self.state),
            next_native: AtomicUsize::new(1),
        }))
    }

    async fn release_worker(&self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeHandle {
    state: Arc<ChainState>,
    next_native: AtomicUsize,
}

fn rpc_error(message: &str) -> LiveError {
    LiveError::Rpc(RpcError::new(-32000, message))
}

impl FakeHandle {
    fn state_call(&self, method: &str, args: &[u8]) -> Result<Vec<u8>> {
        let state = &self.state;
        match method {
            "Metadata_metadata_versions" => {
                let versions = state
                    .metadata_versions
                    .lock()
                    .clone()
                    .ok_or_else(|| rpc_error("Exported method Metadata_metadata_versions is not found"))?;
                Ok(versions.encode())
            },
            "Metadata_metadata_at_version" => {
                let version = u32::decode(&mut &args[..]).map_err(|e| rpc_error(&e.to_string()))?;
                if let Some(raw) = state.raw_metadata_at_version.lock().get(&version) {
                    return Ok(raw.clone());
                }
                Ok(state.versioned_metadata.lock().get(&version).cloned().encode())
            },
            "AccountNonceApi_account_nonce" => Ok(1u32.encode()),
            "TaggedTransactionQueue_validate_transaction" => {
                // source byte, extrinsic, 32-byte block hash
                let extrinsic = &args[1..args.len() - 32];
                let valid = match state.expected_hash.lock().as_ref() {
                    Some(expected) => extrinsic == expected.as_slice(),
                    None => !extrinsic.is_empty(),
                };
                Ok(if valid { vec![0x00, 0x00] } else { vec![0x01, 0x00, 0x0a] })
            },
            other => Err(rpc_error(&format!("Exported method {} is not found", other))),
        }
    }

    fn produce_block(&self) -> String {
        let number = {
            let mut best = self.state.best_block.lock();
            *best += 1;
            *best
        };
        let hash = block_hash(number);
        for sender in self.state.senders.lock().values() {
            let _ = sender.try_send(Ok(json!({
                "event": "bestBlockChanged",
                "bestBlockHash": hash,
            })));
        }
        hash
    }
}

#[async_trait]
impl SimulationHandle for FakeHandle {
    async fn subscribe(&self, _event: &str, _method: &str, _params: Value) -> Result<NativeSubscription> {
        let id = format!("native-{}", self.next_native.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(64);
        let finalized = block_hash(*self.state.best_block.lock());
        let _ = tx.try_send(Ok(json!({
            "event": "initialized",
            "finalizedBlockHashes": [finalized],
        })));
        self.state.senders.lock().insert(id.clone(), tx);
        Ok(NativeSubscription::new(id, rx))
    }

    async fn unsubscribe(&self, _event: &str, _method: &str, subscription_id: &str) -> Result<()> {
        self.state.senders.lock().remove(subscription_id);
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.state.methods.lock().push(method.to_string());
        let state = &self.state;
        match method {
            "state_call" => {
                let name = params[0].as_str().unwrap_or_default().to_string();
                let args = from_hex(params[1].as_str().unwrap_or("0x"))
                    .map_err(|e| rpc_error(&e.to_string()))?;
                Ok(json!(to_hex(&self.state_call(&name, &args)?)))
            },
            "state_getMetadata" => Ok(json!(to_hex(&state.legacy_metadata.lock()))),
            "chainSpec_v1_properties" => Ok(state.properties.lock().clone()),
            "chainSpec_v1_genesisHash" => Ok(json!(GENESIS_HASH)),
            "state_getRuntimeVersion" => Ok(json!({
                "specName": "fake",
                "specVersion": 1_002_000,
                "transactionVersion": 3,
            })),
            "chain_getHeader" => Ok(json!({"number": format!("{:#x}", *state.best_block.lock())})),
            "dev_setStorage" => {
                state.storage_writes.lock().push(params);
                Ok(Value::Null)
            },
            "dev_newBlock" => Ok(json!(self.produce_block())),
            "transaction_v1_broadcast" => Ok(json!("op-1")),
            other => Err(LiveError::Rpc(RpcError::new(-32601, format!("Method not found: {}", other)))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.senders.lock().clear();
        Ok(())
    }
}

/// Decodes the JSON metadata used on the fake chain.
pub struct JsonCodec;

fn codec_error(e: impl ToString) -> LinkError {
    LinkError::Codec(e.to_string())
}

impl MetadataCodec for JsonCodec {
    fn decode(&self, metadata: &[u8]) -> metacheck_link::Result<RuntimeMetadata> {
        serde_json::from_slice(metadata).map_err(codec_error)
    }

    fn storage_key(
        &self,
        metadata: &[u8],
        pallet: &str,
        entry: &str,
        keys: &[&[u8]],
    ) -> metacheck_link::Result<Vec<u8>> {
        self.decode(metadata)?;
        let mut key = format!("{}.{}", pallet, entry).into_bytes();
        for k in keys {
            key.extend_from_slice(k);
        }
        Ok(key)
    }

    fn constant(&self, metadata: &[u8], pallet: &str, name: &str) -> metacheck_link::Result<Vec<u8>> {
        self.decode(metadata)?;
        match (pallet, name) {
            ("Balances", "ExistentialDeposit") => Ok(EXISTENTIAL_DEPOSIT.to_le_bytes().to_vec()),
            _ => Err(codec_error(format!("no constant {}.{}", pallet, name))),
        }
    }

    fn call_data(
        &self,
        metadata: &[u8],
        pallet: &str,
        call: &str,
        args: &[u8],
    ) -> metacheck_link::Result<Vec<u8>> {
        self.decode(metadata)?;
        match (pallet, call) {
            ("System", "remark") => {
                let mut out = vec![0x00, 0x07];
                out.extend_from_slice(args);
                Ok(out)
            },
            _ => Err(codec_error(format!("no call {}.{}", pallet, call))),
        }
    }

    fn signed_extensions(
        &self,
        metadata: &[u8],
        context: &ExtensionContext,
    ) -> metacheck_link::Result<SignedExtensions> {
        let decoded = self.decode(metadata)?;
        Ok(decoded
            .signed_extensions
            .iter()
            .map(|identifier| {
                let value = match identifier.as_str() {
                    "CheckNonce" => Compact(context.nonce).encode(),
                    CHECK_METADATA_HASH => vec![0],
                    _ => Vec::new(),
                };
                (identifier.clone(), SignedExtension::new(identifier.as_str(), value, Vec::new()))
            })
            .collect())
    }
}

/// Digest over the metadata with its `version` field removed.
pub struct FakeDigester;

impl FakeDigester {
    pub fn expected_payload(metadata: &RuntimeMetadata, info: &MerkleizeInfo) -> Vec<u8> {
        let digest = FakeDigester.digest(&encode_metadata(metadata), info).unwrap();
        let mut payload = vec![1];
        payload.extend_from_slice(&digest);
        payload
    }
}

impl MetadataDigester for FakeDigester {
    fn digest(&self, metadata: &[u8], info: &MerkleizeInfo) -> metacheck_core::Result<[u8; 32]> {
        let mut value: Value =
            serde_json::from_slice(metadata).map_err(|e| DiagnosticError::Digest(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.remove("version");
        }
        let canonical = value.to_string();

        let mut out = [0u8; 32];
        for (i, chunk) in out.chunks_mut(8).enumerate() {
            let mut hasher = DefaultHasher::new();
            (i, &canonical, &info.token_symbol, info.decimals).hash(&mut hasher);
            chunk.copy_from_slice(&hasher.finish().to_le_bytes());
        }
        Ok(out)
    }
}

/// Produces the `CheckMetadataHash` additional-signed payload as the
/// "extrinsic", which is all the fake runtime checks.
#[derive(Default)]
pub struct FakeSigner {
    pub signed: Mutex<Vec<SignedExtensions>>,
}

#[async_trait]
impl Signer for FakeSigner {
    fn public_key(&self) -> Vec<u8> {
        ALICE.to_vec()
    }

    async fn sign_tx(
        &self,
        _call_data: &[u8],
        extensions: &SignedExtensions,
        _metadata: &[u8],
        _at_block_number: u32,
    ) -> metacheck_link::Result<Vec<u8>> {
        self.signed.lock().push(extensions.clone());
        Ok(extensions
            .get(CHECK_METADATA_HASH)
            .map(|ext| ext.additional_signed.clone())
            .unwrap_or_default())
    }
}

pub fn toolkit(signer: &Arc<FakeSigner>) -> Toolkit {
    Toolkit::new(
        Arc::new(JsonCodec),
        Arc::new(FakeDigester),
        Arc::clone(signer) as Arc<dyn Signer>,
    )
}
