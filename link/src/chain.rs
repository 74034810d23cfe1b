//! Typed chain operations on top of [`RpcClient`].

use crate::error::{LinkError, Result};
use crate::rpc_client::{RpcClient, Subscription};
use crate::scale::{self, Encode};
use crate::timeouts::LinkTimeouts;
use metacheck_commons::rpc::{from_hex, to_hex, FOLLOW_METHOD, UNFOLLOW_METHOD};
use metacheck_live::SubscriptionMultiplexer;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Metadata versions this client can consume, oldest first.
pub const SUPPORTED_METADATA_VERSIONS: [u32; 3] = [14, 15, 16];

/// Token properties published in the chain spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainProperties {
    pub token_symbol: Option<String>,
    pub token_decimals: Option<u8>,
    pub raw: Map<String, Value>,
}

impl ChainProperties {
    /// Parse the chain-spec properties object. Multi-token chains publish
    /// arrays; the first entry is the native token.
    pub fn from_value(value: &Value) -> Self {
        let raw = value.as_object().cloned().unwrap_or_default();
        let first = |key: &str| match raw.get(key) {
            Some(Value::Array(items)) => items.first().cloned(),
            Some(other) => Some(other.clone()),
            None => None,
        };
        let token_symbol = first("tokenSymbol").and_then(|v| v.as_str().map(str::to_string));
        let token_decimals = first("tokenDecimals")
            .and_then(|v| v.as_u64())
            .and_then(|d| u8::try_from(d).ok());

        Self {
            token_symbol,
            token_decimals,
            raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    pub spec_name: String,
    pub spec_version: u32,
    pub transaction_version: u32,
}

/// Chain client over one logical connection.
pub struct ChainClient {
    rpc: RpcClient,
}

impl ChainClient {
    pub async fn connect(
        multiplexer: &Arc<SubscriptionMultiplexer>,
        timeouts: LinkTimeouts,
    ) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(multiplexer, timeouts).await?,
        })
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Release the underlying logical connection.
    pub async fn destroy(&self) {
        self.rpc.destroy().await;
    }

    pub async fn follow(&self, with_runtime: bool) -> Result<Subscription> {
        self.rpc.subscribe(FOLLOW_METHOD, json!([with_runtime])).await
    }

    pub async fn unfollow(&self, subscription_id: &str) -> Result<()> {
        self.rpc.unsubscribe(UNFOLLOW_METHOD, subscription_id).await
    }

    /// Hash of the latest finalized block, taken from the `initialized`
    /// event of a short-lived follow subscription.
    pub async fn finalized_block(&self) -> Result<String> {
        let mut subscription = self.follow(false).await?;
        let timeout = self.rpc.timeouts().follow_timeout;
        let event = tokio::time::timeout(timeout, subscription.events.recv()).await;

        if let Err(e) = self.unfollow(&subscription.id).await {
            log::debug!("[metacheck-link] Unfollow of {} failed: {}", subscription.id, e);
        }

        let event = match event {
            Ok(Some(event)) => event,
            Ok(None) => return Err(LinkError::Closed),
            Err(_) => {
                return Err(LinkError::Timeout(format!(
                    "no follow event within {:?}",
                    timeout
                )))
            },
        };
        finalized_hash_from_initialized(&event)
    }

    /// `state_call` of a runtime API method with SCALE-encoded `args`.
    pub async fn runtime_call(&self, method: &str, args: &[u8], at: Option<&str>) -> Result<Vec<u8>> {
        let mut params = vec![json!(method), json!(to_hex(args))];
        if let Some(at) = at {
            params.push(json!(at));
        }
        let result = self.rpc.request("state_call", Value::Array(params)).await?;
        decode_hex_value(&result)
    }

    pub async fn metadata_versions(&self, at: Option<&str>) -> Result<Vec<u32>> {
        let raw = self.runtime_call("Metadata_metadata_versions", &[], at).await?;
        scale::decode_vec_u32(&raw)
    }

    /// Metadata at a specific version, `None` when the runtime does not
    /// provide it.
    pub async fn metadata_at_version(&self, version: u32, at: Option<&str>) -> Result<Option<Vec<u8>>> {
        let raw = self
            .runtime_call("Metadata_metadata_at_version", &version.encode(), at)
            .await?;
        scale::decode_option_bytes(&raw)
    }

    /// Metadata at the highest version both the runtime and this client
    /// support. Runtimes without the versioned API fall back to
    /// `state_getMetadata`.
    pub async fn metadata(&self, at: Option<&str>) -> Result<Vec<u8>> {
        match self.metadata_versions(at).await {
            Ok(versions) => {
                let best = versions
                    .into_iter()
                    .filter(|v| SUPPORTED_METADATA_VERSIONS.contains(v))
                    .max();
                if let Some(version) = best {
                    if let Some(metadata) = self.metadata_at_version(version, at).await? {
                        return Ok(metadata);
                    }
                }
            },
            Err(LinkError::Rpc(e)) => {
                log::debug!("[metacheck-link] Versioned metadata API unavailable: {}", e);
            },
            Err(e) => return Err(e),
        }

        let params = match at {
            Some(at) => json!([at]),
            None => json!([]),
        };
        let result = self.rpc.request("state_getMetadata", params).await?;
        decode_hex_value(&result)
    }

    pub async fn chain_spec_properties(&self) -> Result<ChainProperties> {
        let value = match self.rpc.request("chainSpec_v1_properties", json!([])).await {
            Ok(value) => value,
            Err(LinkError::Rpc(e)) => {
                log::debug!("[metacheck-link] chainSpec_v1_properties unavailable: {}", e);
                self.rpc.request("system_properties", json!([])).await?
            },
            Err(e) => return Err(e),
        };
        Ok(ChainProperties::from_value(&value))
    }

    pub async fn genesis_hash(&self) -> Result<String> {
        let value = match self.rpc.request("chainSpec_v1_genesisHash", json!([])).await {
            Ok(value) => value,
            Err(LinkError::Rpc(_)) => self.rpc.request("chain_getBlockHash", json!([0])).await?,
            Err(e) => return Err(e),
        };
        expect_str(&value, "genesis hash").map(str::to_string)
    }

    pub async fn runtime_version(&self, at: Option<&str>) -> Result<RuntimeVersion> {
        let params = match at {
            Some(at) => json!([at]),
            None => json!([]),
        };
        let value = self.rpc.request("state_getRuntimeVersion", params).await?;
        serde_json::from_value(value)
            .map_err(|e| LinkError::Invalid(format!("runtime version: {}", e)))
    }

    pub async fn block_number(&self, block_hash: &str) -> Result<u32> {
        let header = self.rpc.request("chain_getHeader", json!([block_hash])).await?;
        let number = header
            .get("number")
            .ok_or_else(|| LinkError::Invalid(format!("no header for {}", block_hash)))?;
        match number {
            Value::String(hex) => u32::from_str_radix(hex.trim_start_matches("0x"), 16)
                .map_err(|e| LinkError::Decode(format!("block number {}: {}", hex, e))),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| LinkError::Decode(format!("block number {}", n))),
            other => Err(LinkError::Invalid(format!("block number {}", other))),
        }
    }

    pub async fn account_nonce(&self, account: &[u8], at: &str) -> Result<u64> {
        let raw = self
            .runtime_call("AccountNonceApi_account_nonce", account, Some(at))
            .await?;
        scale::decode_nonce(&raw)
    }

    /// Overwrite raw storage entries in the simulation. `None` deletes.
    pub async fn set_storage(&self, entries: &[(Vec<u8>, Option<Vec<u8>>)]) -> Result<()> {
        let pairs: Vec<Value> = entries
            .iter()
            .map(|(key, value)| json!([to_hex(key), value.as_deref().map(to_hex)]))
            .collect();
        self.rpc.request("dev_setStorage", json!([pairs])).await?;
        Ok(())
    }

    /// Produce one block in the simulation. Returns its hash when reported.
    pub async fn new_block(&self) -> Result<Option<String>> {
        let value = self.rpc.request("dev_newBlock", json!([])).await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Dry-run a signed transaction against the runtime at `at`.
    pub async fn validate_transaction(&self, extrinsic: &[u8], at: &str) -> Result<()> {
        let block_hash = from_hex(at)?;
        let args = scale::validate_transaction_args(extrinsic, &block_hash);
        let raw = self
            .runtime_call("TaggedTransactionQueue_validate_transaction", &args, Some(at))
            .await?;
        if scale::is_valid_transaction(&raw)? {
            Ok(())
        } else {
            Err(LinkError::Invalid(format!("transaction rejected: {}", to_hex(&raw))))
        }
    }

    /// Hand a signed transaction to the node for gossiping. Returns the
    /// broadcast operation id.
    pub async fn broadcast_transaction(&self, extrinsic: &[u8]) -> Result<String> {
        let value = self
            .rpc
            .request("transaction_v1_broadcast", json!([to_hex(extrinsic)]))
            .await?;
        match value {
            Value::String(operation_id) => Ok(operation_id),
            Value::Null => Err(LinkError::Invalid("broadcast refused".to_string())),
            other => Err(LinkError::Invalid(format!("broadcast operation id {}", other))),
        }
    }
}

/// Extract the finalized hash from an `initialized` follow event. The newest
/// hash is the last of `finalizedBlockHashes`; older servers send a single
/// `finalizedBlockHash`.
pub fn finalized_hash_from_initialized(event: &Value) -> Result<String> {
    if event.get("event").and_then(Value::as_str) != Some("initialized") {
        return Err(LinkError::Invalid(format!("expected initialized event, got {}", event)));
    }
    event
        .get("finalizedBlockHashes")
        .and_then(Value::as_array)
        .and_then(|hashes| hashes.last())
        .or_else(|| event.get("finalizedBlockHash"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LinkError::Invalid("initialized event without finalized hash".to_string()))
}

fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| LinkError::Invalid(format!("{}: expected string, got {}", what, value)))
}

fn decode_hex_value(value: &Value) -> Result<Vec<u8>> {
    Ok(from_hex(expect_str(value, "hex result")?)?)
}
