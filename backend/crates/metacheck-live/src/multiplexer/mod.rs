//! Subscription multiplexer over one shared simulation handle.
//!
//! Consumers open [`LogicalConnection`]s and talk JSON-RPC text frames:
//!
//! - `chainHead_v1_follow` becomes a native subscription. The consumer gets a
//!   fresh protocol subscription id, then events as
//!   `chainHead_v1_followEvent` notifications.
//! - `chainHead_v1_unfollow` stops the matching native subscription. It
//!   produces no reply.
//! - every other method is forwarded to the handle as a generic request and
//!   answered with its result or error.
//!
//! The handle is created lazily on the first connection and closed, followed
//! by a worker release, when the last connection disconnects.

use crate::connection::{ConnectionState, SubscriptionRecord};
use crate::error::{LiveError, Result};
use crate::simulation::{NativeSubscription, SimulationEngine, SimulationHandle};
use futures_util::future::join_all;
use metacheck_commons::rpc::{FOLLOW_EVENT, FOLLOW_METHOD, UNFOLLOW_METHOD};
use metacheck_commons::{
    ConnectionId, ForkParams, RpcError, RpcNotification, RpcReply, RpcRequest, SubscriptionId,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shares one lazily created simulation handle between many logical
/// connections.
pub struct SubscriptionMultiplexer {
    engine: Arc<dyn SimulationEngine>,
    params: ForkParams,
    /// `None` whenever no connection is live. Holding the lock serializes
    /// handle creation and teardown.
    handle: Mutex<Option<Arc<dyn SimulationHandle>>>,
    live_connections: AtomicUsize,
    next_connection: AtomicU64,
}

impl SubscriptionMultiplexer {
    pub fn new(engine: Arc<dyn SimulationEngine>, params: ForkParams) -> Arc<Self> {
        Arc::new(Self {
            engine,
            params,
            handle: Mutex::new(None),
            live_connections: AtomicUsize::new(0),
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn params(&self) -> &ForkParams {
        &self.params
    }

    /// Open a logical connection. Every frame destined for the consumer is
    /// pushed to `on_message`, in order.
    ///
    /// Creates the simulation handle if this is the first live connection.
    /// Setup failures propagate; the worker is released when nothing else
    /// uses it.
    pub async fn connect(
        self: &Arc<Self>,
        on_message: mpsc::UnboundedSender<String>,
    ) -> Result<LogicalConnection> {
        let handle = {
            let mut slot = self.handle.lock().await;
            let handle = match slot.as_ref() {
                Some(handle) => Arc::clone(handle),
                None => {
                    log::info!(
                        "[metacheck-live] Creating simulation for {} at {}",
                        self.params.endpoint,
                        self.params
                            .block
                            .as_ref()
                            .map(|b| b.to_string())
                            .unwrap_or_else(|| "finalized".to_string())
                    );
                    match self.engine.setup(&self.params).await {
                        Ok(handle) => {
                            *slot = Some(Arc::clone(&handle));
                            handle
                        },
                        Err(e) => {
                            log::warn!("[metacheck-live] Simulation setup failed: {}", e);
                            if self.live_connections() == 0 {
                                self.engine.release_worker().await;
                            }
                            return Err(e);
                        },
                    }
                },
            };
            self.live_connections.fetch_add(1, Ordering::AcqRel);
            handle
        };

        let id = ConnectionId::new(format!(
            "conn-{}",
            self.next_connection.fetch_add(1, Ordering::Relaxed)
        ));
        log::debug!(
            "[metacheck-live] Opened connection {} ({} live)",
            id,
            self.live_connections()
        );

        Ok(LogicalConnection {
            inner: Arc::new(ConnectionInner {
                multiplexer: Arc::clone(self),
                handle,
                state: ConnectionState::new(id),
                outbound: on_message,
            }),
        })
    }

    /// Whether a simulation handle currently exists.
    pub async fn is_active(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    pub(crate) fn live_connections(&self) -> usize {
        self.live_connections.load(Ordering::Acquire)
    }

    async fn release_connection(&self, connection_id: &ConnectionId) {
        let mut slot = self.handle.lock().await;

        let previous = match self.live_connections.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |count| count.checked_sub(1),
        ) {
            Ok(previous) => previous,
            Err(_) => {
                log::warn!(
                    "[metacheck-live] Release of {} with no live connections ignored",
                    connection_id
                );
                return;
            },
        };

        if previous > 1 {
            log::debug!(
                "[metacheck-live] Connection {} released, {} still live",
                connection_id,
                previous - 1
            );
            return;
        }

        if let Some(handle) = slot.take() {
            log::info!("[metacheck-live] Last connection gone, closing simulation");
            if let Err(e) = handle.close().await {
                log::warn!("[metacheck-live] Failed to close simulation: {}", e);
            }
        }
        self.engine.release_worker().await;
    }
}

/// One consumer's view of the multiplexer.
///
/// Cheap to clone; clones share the same subscriptions. Dropping the last
/// clone without [`disconnect`](Self::disconnect) schedules the same teardown
/// on the current runtime.
#[derive(Clone)]
pub struct LogicalConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    multiplexer: Arc<SubscriptionMultiplexer>,
    handle: Arc<dyn SimulationHandle>,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<String>,
}

impl LogicalConnection {
    pub fn id(&self) -> &ConnectionId {
        self.inner.state.id()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// Number of follow subscriptions currently open on this connection.
    pub fn subscription_count(&self) -> usize {
        self.inner.state.subscription_count()
    }

    /// Handle one JSON-RPC text frame from the consumer.
    ///
    /// Replies and events are delivered through the connection's message
    /// channel, never returned. An `Err` is returned alongside the error reply
    /// when the frame is malformed or a follow cannot be started.
    pub async fn send(&self, raw: &str) -> Result<()> {
        let inner = &self.inner;
        if inner.state.is_closed() {
            return Err(LiveError::ConnectionClosed(inner.state.id().clone()));
        }

        let request: RpcRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(e) => {
                log::warn!(
                    "[metacheck-live] Unparseable frame on {}: {}",
                    inner.state.id(),
                    e
                );
                inner.deliver(
                    RpcReply::failure(Value::Null, RpcError::parse_error(e.to_string())).to_json(),
                );
                return Err(LiveError::InvalidMessage(e.to_string()));
            },
        };

        let method = request.method.clone();
        match method.as_str() {
            FOLLOW_METHOD => inner.follow(request).await,
            UNFOLLOW_METHOD => {
                inner.unfollow(&request).await;
                Ok(())
            },
            _ => {
                inner.forward(request).await;
                Ok(())
            },
        }
    }

    /// Tear down every subscription of this connection and release it.
    /// Idempotent: only the first call has any effect.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        if !inner.state.mark_closed() {
            log::debug!("[metacheck-live] {} already disconnected", inner.state.id());
            return;
        }
        teardown_subscriptions(&inner.handle, inner.state.id(), inner.state.drain()).await;
        inner.multiplexer.release_connection(inner.state.id()).await;
    }
}

impl ConnectionInner {
    fn deliver(&self, frame: String) -> bool {
        if self.outbound.send(frame).is_err() {
            log::debug!("[metacheck-live] Consumer of {} is gone", self.state.id());
            return false;
        }
        true
    }

    async fn follow(&self, request: RpcRequest) -> Result<()> {
        let NativeSubscription {
            id: native_id,
            events,
        } = match self.handle.subscribe(FOLLOW_EVENT, &request.method, request.params.clone()).await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                log::error!(
                    "[metacheck-live] Follow on {} failed: {}",
                    self.state.id(),
                    e
                );
                self.deliver(RpcReply::failure(request.id, e.to_rpc_error()).to_json());
                return Err(e);
            },
        };

        let subscription_id = SubscriptionId::new(Uuid::new_v4().simple().to_string());
        let cancel = CancellationToken::new();
        self.state.insert(
            subscription_id.clone(),
            SubscriptionRecord::new(native_id.clone(), cancel.clone()),
        );

        // A disconnect that raced us may have drained before the insert.
        // Whoever removes the record owns the native unsubscribe.
        if self.state.is_closed() {
            if self.state.remove(&subscription_id).is_some() {
                if let Err(e) =
                    self.handle.unsubscribe(FOLLOW_EVENT, UNFOLLOW_METHOD, &native_id).await
                {
                    log::debug!("[metacheck-live] Unsubscribe of {} failed: {}", native_id, e);
                }
            }
            return Err(LiveError::ConnectionClosed(self.state.id().clone()));
        }

        log::debug!(
            "[metacheck-live] {} follows as {} (native {})",
            self.state.id(),
            subscription_id,
            native_id
        );

        // Confirmation goes out before the forwarder can emit any event.
        self.deliver(
            RpcReply::success(request.id, Value::String(subscription_id.to_string())).to_json(),
        );
        tokio::spawn(forward_events(
            self.state.id().clone(),
            subscription_id,
            events,
            self.outbound.clone(),
            cancel,
        ));
        Ok(())
    }

    async fn unfollow(&self, request: &RpcRequest) {
        let Some(raw_id) = request.first_param_str() else {
            log::debug!("[metacheck-live] Unfollow without subscription id ignored");
            return;
        };
        let Some(record) = self.state.remove(&SubscriptionId::from(raw_id)) else {
            log::debug!(
                "[metacheck-live] Unfollow of unknown subscription {} on {} ignored",
                raw_id,
                self.state.id()
            );
            return;
        };

        record.cancel.cancel();
        if let Err(e) = self.handle.unsubscribe(FOLLOW_EVENT, UNFOLLOW_METHOD, &record.native_id).await
        {
            log::warn!(
                "[metacheck-live] Unsubscribe of {} failed: {}",
                record.native_id,
                e
            );
        }
    }

    async fn forward(&self, request: RpcRequest) {
        let reply = match self.handle.request(&request.method, request.params).await {
            Ok(result) => RpcReply::success(request.id, result),
            Err(e) => {
                log::debug!("[metacheck-live] {} failed: {}", request.method, e);
                RpcReply::failure(request.id, e.to_rpc_error())
            },
        };
        self.deliver(reply.to_json());
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if !self.state.mark_closed() {
            return;
        }
        let records = self.state.drain();
        let handle = Arc::clone(&self.handle);
        let multiplexer = Arc::clone(&self.multiplexer);
        let id = self.state.id().clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                log::debug!("[metacheck-live] {} dropped without disconnect", id);
                runtime.spawn(async move {
                    teardown_subscriptions(&handle, &id, records).await;
                    multiplexer.release_connection(&id).await;
                });
            },
            Err(_) => {
                log::warn!(
                    "[metacheck-live] {} dropped outside a runtime; simulation left open",
                    id
                );
            },
        }
    }
}

async fn teardown_subscriptions(
    handle: &Arc<dyn SimulationHandle>,
    connection_id: &ConnectionId,
    records: Vec<(SubscriptionId, SubscriptionRecord)>,
) {
    if records.is_empty() {
        return;
    }
    log::debug!(
        "[metacheck-live] Tearing down {} subscription(s) of {}",
        records.len(),
        connection_id
    );

    let unsubscribes = records.into_iter().map(|(subscription_id, record)| {
        record.cancel.cancel();
        let handle = Arc::clone(handle);
        async move {
            if let Err(e) =
                handle.unsubscribe(FOLLOW_EVENT, UNFOLLOW_METHOD, &record.native_id).await
            {
                log::debug!(
                    "[metacheck-live] Unsubscribe of {} ({}) failed during teardown: {}",
                    subscription_id,
                    record.native_id,
                    e
                );
            }
        }
    });
    join_all(unsubscribes).await;
}

async fn forward_events(
    connection_id: ConnectionId,
    subscription_id: SubscriptionId,
    mut events: mpsc::Receiver<Result<Value>>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(Ok(result)) => {
                    let frame = RpcNotification::follow_event(subscription_id.as_str(), result).to_json();
                    if outbound.send(frame).is_err() {
                        log::debug!("[metacheck-live] Consumer of {} is gone", connection_id);
                        break;
                    }
                },
                Some(Err(e)) => {
                    log::error!(
                        "[metacheck-live] Follow event error on {}/{}: {}",
                        connection_id,
                        subscription_id,
                        e
                    );
                },
                None => {
                    log::debug!("[metacheck-live] Native stream for {} ended", subscription_id);
                    break;
                },
            },
        }
    }
}
