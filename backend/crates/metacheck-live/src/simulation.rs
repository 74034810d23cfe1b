//! The seam between the multiplexer and a forked-chain simulation.
//!
//! A [`SimulationEngine`] creates [`SimulationHandle`]s, each one a running
//! fork bound to one upstream endpoint/block. Handles are expensive (seconds
//! to create) and must be closed explicitly. Native subscriptions deliver
//! events through a channel; unsubscribing closes it.

use crate::error::Result;
use async_trait::async_trait;
use metacheck_commons::ForkParams;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default capacity for native subscription event channels.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A native subscription: the handle's own identifier plus its event stream.
///
/// The stream ends when the handle unsubscribes or closes.
#[derive(Debug)]
pub struct NativeSubscription {
    pub id: String,
    pub events: mpsc::Receiver<Result<Value>>,
}

impl NativeSubscription {
    pub fn new(id: impl Into<String>, events: mpsc::Receiver<Result<Value>>) -> Self {
        Self {
            id: id.into(),
            events,
        }
    }
}

/// One running forked-chain instance.
#[async_trait]
pub trait SimulationHandle: Send + Sync {
    /// Start a native subscription. `event` is the notification name the
    /// events arrive under, `method` the subscribing method.
    async fn subscribe(&self, event: &str, method: &str, params: Value)
        -> Result<NativeSubscription>;

    /// Stop a native subscription started with [`subscribe`](Self::subscribe).
    async fn unsubscribe(&self, event: &str, method: &str, subscription_id: &str) -> Result<()>;

    /// Generic request (e.g. `dev_newBlock`, `dev_setStorage`, `state_call`).
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Shut the fork down. Subsequent calls fail with `LiveError::Closed`.
    async fn close(&self) -> Result<()>;
}

/// Factory for simulation handles, owner of any worker resource they share.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    /// Fork the chain described by `params` and wait until it is ready.
    async fn setup(&self, params: &ForkParams) -> Result<Arc<dyn SimulationHandle>>;

    /// Release worker resources no longer used by any open handle.
    /// Must never fail; problems are logged.
    async fn release_worker(&self);
}
