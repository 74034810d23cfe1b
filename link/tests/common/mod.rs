//! In-memory simulation standing in for a forked chain.
//!
//! Implements just enough of the node RPC surface for the chain client:
//! follow subscriptions, `state_call` for the metadata/nonce/validation
//! runtime APIs, chain-spec and header queries, and the dev methods.

#![allow(dead_code)]

use async_trait::async_trait;
use metacheck_commons::rpc::{from_hex, to_hex};
use metacheck_commons::{ForkParams, RpcError};
use metacheck_link::scale::{Decode, Encode};
use metacheck_live::{
    LiveError, NativeSubscription, Result, SimulationEngine, SimulationHandle,
    SubscriptionMultiplexer,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const GENESIS_HASH: &str = "0x9100000000000000000000000000000000000000000000000000000000000091";

pub fn block_hash(number: u32) -> String {
    format!("0x{:064x}", number)
}

/// Knobs and recordings shared by the engine and its handles.
#[derive(Default)]
pub struct ChainState {
    /// `None` makes `Metadata_metadata_versions` fail like an old runtime.
    pub metadata_versions: Mutex<Option<Vec<u32>>>,
    pub versioned_metadata: Mutex<HashMap<u32, Vec<u8>>>,
    pub legacy_metadata: Mutex<Vec<u8>>,
    pub reject_transactions: Mutex<bool>,
    pub chain_spec_v1: Mutex<bool>,
    pub best_block: Mutex<u32>,
    pub storage_writes: Mutex<Vec<Value>>,
    pub methods: Mutex<Vec<String>>,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    pub closes: AtomicUsize,
    senders: Mutex<HashMap<String, mpsc::Sender<Result<Value>>>>,
}

impl ChainState {
    pub fn called(&self, method: &str) -> bool {
        self.methods.lock().iter().any(|m| m == method)
    }
}

pub struct FakeEngine {
    pub state: Arc<ChainState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let state = ChainState::default();
        *state.best_block.lock() = 41;
        *state.legacy_metadata.lock() = b"legacy-v14".to_vec();
        Self {
            state: Arc::new(state),
        }
    }

    pub fn multiplexer(self: &Arc<Self>) -> Arc<SubscriptionMultiplexer> {
        SubscriptionMultiplexer::new(
            Arc::clone(self) as Arc<dyn SimulationEngine>,
            ForkParams::new("wss://fake.example.org"),
        )
    }
}

#[async_trait]
impl SimulationEngine for FakeEngine {
    async fn setup(&self, _params: &ForkParams) -> Result<Arc<dyn SimulationHandle>> {
        Ok(Arc::new(FakeHandle {
            state: Arc::clone(&self.state),
            next_native: AtomicUsize::new(1),
        }))
    }

    async fn release_worker(&self) {}
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
                Ok(state.versioned_metadata.lock().get(&version).cloned().encode())
            },
            "AccountNonceApi_account_nonce" => Ok(5u32.encode()),
            "TaggedTransactionQueue_validate_transaction" => {
                if *state.reject_transactions.lock() {
                    Ok(vec![0x01, 0x00, 0x0a])
                } else {
                    Ok(vec![0x00, 0x00])
                }
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
        self.state.subscribes.fetch_add(1, Ordering::SeqCst);
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
        self.state.unsubscribes.fetch_add(1, Ordering::SeqCst);
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
            "chainSpec_v1_properties" if !*state.chain_spec_v1.lock() => {
                Err(LiveError::Rpc(RpcError::new(-32601, "Method not found")))
            },
            "chainSpec_v1_properties" => Ok(json!({"tokenSymbol": "DOT", "tokenDecimals": 10})),
            "system_properties" => Ok(json!({"tokenSymbol": ["KAR", "KUSD"], "tokenDecimals": [12, 12]})),
            "chainSpec_v1_genesisHash" => Ok(json!(GENESIS_HASH)),
            "state_getRuntimeVersion" => Ok(json!({
                "specName": "fake",
                "specVersion": 1_002_000,
                "transactionVersion": 3,
                "implVersion": 0,
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
