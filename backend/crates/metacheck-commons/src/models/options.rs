use serde::{Deserialize, Serialize};
use std::fmt;

/// Block to fork from: a block number or a `0x`-prefixed block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockRef {
    Number(u32),
    Hash(String),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Number(n) => write!(f, "{}", n),
            BlockRef::Hash(h) => write!(f, "{}", h),
        }
    }
}

/// Parameters identifying one forked chain instance.
///
/// Two multiplexers built from equal parameters fork the same chain state.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ForkParams {
    /// Upstream node endpoint (e.g. `wss://rpc.polkadot.io`)
    pub endpoint: String,
    /// Block to fork at; latest finalized when `None`
    pub block: Option<BlockRef>,
    /// Runtime code injected into the fork in place of the on-chain code
    pub wasm_override: Option<Vec<u8>>,
}

impl ForkParams {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            block: None,
            wasm_override: None,
        }
    }

    pub fn with_block(mut self, block: Option<BlockRef>) -> Self {
        self.block = block;
        self
    }

    pub fn with_wasm_override(mut self, code: Option<Vec<u8>>) -> Self {
        self.wasm_override = code;
        self
    }
}

impl fmt::Debug for ForkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkParams")
            .field("endpoint", &self.endpoint)
            .field("block", &self.block)
            .field(
                "wasm_override",
                &self.wasm_override.as_ref().map(|code| format!("<{} bytes>", code.len())),
            )
            .finish()
    }
}

/// Token parameters used when merkleizing metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

impl TokenInfo {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: Some(symbol.into()),
            decimals: Some(decimals),
        }
    }

    /// Both fields were supplied, so chain-spec properties need not be fetched.
    pub fn is_complete(&self) -> bool {
        self.symbol.is_some() && self.decimals.is_some()
    }
}

/// Caller options for one diagnostic run.
#[derive(Clone, Default)]
pub struct DiagnosticOptions {
    /// Runtime code to inject into the fork
    pub injected_code: Option<Vec<u8>>,
    /// Block to fork at
    pub fork_block: Option<BlockRef>,
    /// Token symbol/decimals overrides
    pub token: Option<TokenInfo>,
}

impl DiagnosticOptions {
    /// Fork parameters for running these options against `endpoint`.
    pub fn fork_params(&self, endpoint: &str) -> ForkParams {
        ForkParams::new(endpoint)
            .with_block(self.fork_block.clone())
            .with_wasm_override(self.injected_code.clone())
    }
}

impl fmt::Debug for DiagnosticOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticOptions")
            .field(
                "injected_code",
                &self.injected_code.as_ref().map(|code| format!("<{} bytes>", code.len())),
            )
            .field("fork_block", &self.fork_block)
            .field("token", &self.token)
            .finish()
    }
}
