//! JSON-RPC 2.0 client over one logical connection.
//!
//! Outbound requests go through [`LogicalConnection::send`]. Everything the
//! multiplexer delivers back arrives on one channel, consumed by a single
//! router task that resolves pending requests by id and routes subscription
//! notifications. A subscription's event channel is created by the router
//! while it handles the confirming reply, so an event that follows the
//! confirmation always finds its channel.

use crate::error::{LinkError, Result};
use crate::timeouts::LinkTimeouts;
use metacheck_commons::{RpcMessage, RpcNotification, RpcReply, RpcRequest};
use metacheck_live::{LogicalConnection, SubscriptionMultiplexer};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// An open subscription: the id the server assigned plus its events.
///
/// The stream ends when the client is destroyed or the subscription is
/// dropped by [`RpcClient::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub events: mpsc::UnboundedReceiver<Value>,
}

enum PendingRequest {
    Call(oneshot::Sender<Result<Value>>),
    Subscribe(oneshot::Sender<Result<Subscription>>),
}

/// State shared with the router task. Deliberately excludes the connection:
/// the router must not keep the delivery channel alive.
#[derive(Default)]
struct RouterState {
    pending: Mutex<HashMap<u64, PendingRequest>>,
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl RouterState {
    fn resolve(&self, reply: RpcReply) {
        let Some(id) = reply.id.as_u64() else {
            log::debug!("[metacheck-link] Reply with non-numeric id {}", reply.id);
            return;
        };
        let Some(pending) = self.pending.lock().remove(&id) else {
            log::debug!("[metacheck-link] Reply for unknown or expired request {}", id);
            return;
        };

        let outcome = reply.outcome.map_err(LinkError::Rpc);
        match pending {
            PendingRequest::Call(tx) => {
                let _ = tx.send(outcome);
            },
            PendingRequest::Subscribe(tx) => {
                let subscription = outcome.and_then(|value| match value {
                    Value::String(id) => {
                        let (events_tx, events) = mpsc::unbounded_channel();
                        self.subscriptions.lock().insert(id.clone(), events_tx);
                        Ok(Subscription { id, events })
                    },
                    other => Err(LinkError::Invalid(format!(
                        "subscription id must be a string, got {}",
                        other
                    ))),
                });
                if let Err(Ok(subscription)) = tx.send(subscription) {
                    log::debug!(
                        "[metacheck-link] Subscriber of {} gave up before confirmation",
                        subscription.id
                    );
                    self.subscriptions.lock().remove(&subscription.id);
                }
            },
        }
    }

    fn dispatch(&self, notification: RpcNotification) {
        let mut subscriptions = self.subscriptions.lock();
        let Some(tx) = subscriptions.get(&notification.subscription) else {
            log::debug!(
                "[metacheck-link] Event for unknown subscription {}",
                notification.subscription
            );
            return;
        };
        if tx.send(notification.result).is_err() {
            log::debug!(
                "[metacheck-link] Subscription {} receiver dropped",
                notification.subscription
            );
            subscriptions.remove(&notification.subscription);
        }
    }

    fn fail_all(&self) {
        for (_, pending) in self.pending.lock().drain() {
            match pending {
                PendingRequest::Call(tx) => {
                    let _ = tx.send(Err(LinkError::Closed));
                },
                PendingRequest::Subscribe(tx) => {
                    let _ = tx.send(Err(LinkError::Closed));
                },
            }
        }
        self.subscriptions.lock().clear();
    }
}

/// JSON-RPC client bound to one [`LogicalConnection`].
pub struct RpcClient {
    connection: LogicalConnection,
    state: Arc<RouterState>,
    next_id: AtomicU64,
    closed: AtomicBool,
    timeouts: LinkTimeouts,
    router: JoinHandle<()>,
}

impl RpcClient {
    /// Open a logical connection on `multiplexer` and start routing its
    /// messages.
    pub async fn connect(
        multiplexer: &Arc<SubscriptionMultiplexer>,
        timeouts: LinkTimeouts,
    ) -> Result<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connection = multiplexer.connect(inbound_tx).await?;
        let state = Arc::new(RouterState::default());
        let router = tokio::spawn(route_messages(inbound_rx, Arc::clone(&state)));

        log::debug!("[metacheck-link] Client attached to {}", connection.id());
        Ok(Self {
            connection,
            state,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            timeouts,
            router,
        })
    }

    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.timeouts
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.call(method, params, PendingRequest::Call(tx), rx).await
    }

    /// Start a subscription. `method` is the subscribing method, e.g.
    /// `chainHead_v1_follow`.
    pub async fn subscribe(&self, method: &str, params: Value) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.call(method, params, PendingRequest::Subscribe(tx), rx).await
    }

    /// Stop routing events for `subscription_id` and send `method` for it.
    /// Methods like `chainHead_v1_unfollow` produce no reply, so none is
    /// awaited.
    pub async fn unsubscribe(&self, method: &str, subscription_id: &str) -> Result<()> {
        self.state.subscriptions.lock().remove(subscription_id);
        self.notify(method, Value::Array(vec![Value::String(subscription_id.to_string())]))
            .await
    }

    /// Fire-and-forget request.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connection
            .send(&RpcRequest::new(id, method, params).to_json())
            .await
            .map_err(LinkError::from)
    }

    /// Disconnect the logical connection. Pending requests fail with
    /// [`LinkError::Closed`] and every subscription stream ends. Idempotent.
    pub async fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connection.disconnect().await;
        self.router.abort();
        self.state.fail_all();
        log::debug!("[metacheck-link] Client on {} destroyed", self.connection.id());
    }

    async fn call<T>(
        &self,
        method: &str,
        params: Value,
        pending: PendingRequest,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.pending.lock().insert(id, pending);

        if let Err(e) = self
            .connection
            .send(&RpcRequest::new(id, method, params).to_json())
            .await
        {
            // The multiplexer may have replied with an error before failing
            // the send; that reply wins if the router already took it.
            if self.state.pending.lock().remove(&id).is_some() {
                return Err(e.into());
            }
        }

        match tokio::time::timeout(self.timeouts.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LinkError::Closed),
            Err(_) => {
                self.state.pending.lock().remove(&id);
                Err(LinkError::Timeout(format!(
                    "{} got no reply within {:?}",
                    method, self.timeouts.request_timeout
                )))
            },
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn route_messages(mut inbound: mpsc::UnboundedReceiver<String>, state: Arc<RouterState>) {
    while let Some(frame) = inbound.recv().await {
        match RpcMessage::parse(&frame) {
            Ok(RpcMessage::Response(reply)) => state.resolve(reply),
            Ok(RpcMessage::Notification(notification)) => state.dispatch(notification),
            Ok(RpcMessage::Other(value)) => {
                log::debug!("[metacheck-link] Ignoring unroutable message: {}", value);
            },
            Err(e) => log::warn!("[metacheck-link] Failed to parse message: {}", e),
        }
    }
    state.fail_all();
}
