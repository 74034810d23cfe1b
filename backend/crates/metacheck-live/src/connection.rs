//! Per-connection bookkeeping.
//!
//! Each logical connection owns its own subscription table, so teardown of
//! one connection never touches another's native subscriptions.

use dashmap::DashMap;
use metacheck_commons::{ConnectionId, SubscriptionId};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// A live follow subscription: the native id on the simulation handle, plus
/// the token stopping its event forwarder.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub native_id: String,
    pub cancel: CancellationToken,
}

impl SubscriptionRecord {
    pub fn new(native_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            native_id: native_id.into(),
            cancel,
        }
    }
}

/// Subscription table and lifecycle flag for one logical connection.
#[derive(Debug)]
pub struct ConnectionState {
    id: ConnectionId,
    subscriptions: DashMap<SubscriptionId, SubscriptionRecord>,
    closed: AtomicBool,
}

impl ConnectionState {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            subscriptions: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn insert(&self, subscription_id: SubscriptionId, record: SubscriptionRecord) {
        self.subscriptions.insert(subscription_id, record);
    }

    pub fn remove(&self, subscription_id: &SubscriptionId) -> Option<SubscriptionRecord> {
        self.subscriptions.remove(subscription_id).map(|(_, record)| record)
    }

    pub fn contains(&self, subscription_id: &SubscriptionId) -> bool {
        self.subscriptions.contains_key(subscription_id)
    }

    /// Remove and return every record.
    pub fn drain(&self) -> Vec<(SubscriptionId, SubscriptionRecord)> {
        let ids: Vec<SubscriptionId> =
            self.subscriptions.iter().map(|entry| entry.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.subscriptions.remove(&id))
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark closed. Returns `true` only for the call that performed the
    /// transition.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
