//! WebSocket JSON-RPC connection to one Chopsticks worker.
//!
//! A single background task owns the socket. The public handle talks to it
//! over a command channel:
//!
//! - requests are tracked by numeric id until their reply arrives
//! - a subscription is registered when its confirmation is processed, so a
//!   notification can never race ahead of the subscription it belongs to
//! - unsubscribing drops the event sender, ending the consumer's stream
//! - a consumer that falls a full channel behind gets a `stop` event and
//!   its stream ends
//! - when the socket ends every pending request fails and every stream ends

use crate::error::ForkError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use metacheck_commons::{RpcMessage, RpcNotification, RpcReply, RpcRequest};
use metacheck_live::{
    LiveError, NativeSubscription, Result, SimulationHandle, DEFAULT_EVENT_CHANNEL_CAPACITY,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const STOP_DELIVERY_GRACE: Duration = Duration::from_secs(5);

enum HandleCmd {
    Request {
        method: String,
        params: Value,
        result_tx: oneshot::Sender<Result<Value>>,
    },
    Subscribe {
        event: String,
        method: String,
        params: Value,
        event_tx: mpsc::Sender<Result<Value>>,
        result_tx: oneshot::Sender<Result<String>>,
    },
    Unsubscribe {
        method: String,
        subscription_id: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done_tx: Option<oneshot::Sender<()>>,
    },
}

/// What to do with the reply carrying a given request id.
enum Pending {
    Call(oneshot::Sender<Result<Value>>),
    Subscribe {
        event: String,
        event_tx: mpsc::Sender<Result<Value>>,
        result_tx: oneshot::Sender<Result<String>>,
    },
    Unsubscribe(oneshot::Sender<Result<()>>),
}

struct SubEntry {
    event: String,
    event_tx: mpsc::Sender<Result<Value>>,
}

/// [`SimulationHandle`] over a Chopsticks worker's WebSocket endpoint.
pub struct ChopsticksHandle {
    url: String,
    cmd_tx: mpsc::Sender<HandleCmd>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    _task: JoinHandle<()>,
}

impl ChopsticksHandle {
    /// Connect to a running worker.
    pub async fn connect(
        url: &str,
        request_timeout: Duration,
    ) -> std::result::Result<Self, ForkError> {
        let (ws, _response) =
            connect_async(url).await.map_err(|e| ForkError::WebSocket(e.to_string()))?;
        log::debug!("[metacheck-fork] Connected to worker at {}", url);

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(connection_task(ws, cmd_rx, Arc::clone(&closed), url.to_string()));

        Ok(Self {
            url: url.to_string(),
            cmd_tx,
            closed,
            request_timeout,
            _task: task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shared flag flipped once the socket is gone.
    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    async fn dispatch<T>(
        &self,
        cmd: HandleCmd,
        result_rx: oneshot::Receiver<Result<T>>,
        what: &str,
    ) -> Result<T> {
        if self.is_closed() {
            return Err(LiveError::Closed);
        }
        self.cmd_tx.send(cmd).await.map_err(|_| LiveError::Closed)?;
        match tokio::time::timeout(self.request_timeout, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LiveError::Closed),
            Err(_) => Err(LiveError::Timeout(format!(
                "{} got no reply within {:?}",
                what, self.request_timeout
            ))),
        }
    }
}

#[async_trait]
impl SimulationHandle for ChopsticksHandle {
    async fn subscribe(
        &self,
        event: &str,
        method: &str,
        params: Value,
    ) -> Result<NativeSubscription> {
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = oneshot::channel();
        let cmd = HandleCmd::Subscribe {
            event: event.to_string(),
            method: method.to_string(),
            params,
            event_tx,
            result_tx,
        };
        let id = self.dispatch(cmd, result_rx, method).await?;
        Ok(NativeSubscription::new(id, event_rx))
    }

    async fn unsubscribe(&self, _event: &str, method: &str, subscription_id: &str) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        let cmd = HandleCmd::Unsubscribe {
            method: method.to_string(),
            subscription_id: subscription_id.to_string(),
            result_tx,
        };
        self.dispatch(cmd, result_rx, method).await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let (result_tx, result_rx) = oneshot::channel();
        let cmd = HandleCmd::Request {
            method: method.to_string(),
            params,
            result_tx,
        };
        self.dispatch(cmd, result_rx, method).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(HandleCmd::Shutdown {
                done_tx: Some(done_tx),
            })
            .await
            .is_err()
        {
            // Task already gone.
            return Ok(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, done_rx).await.is_err() {
            log::warn!("[metacheck-fork] Worker connection {} did not shut down in time", self.url);
        }
        Ok(())
    }
}

impl Drop for ChopsticksHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(HandleCmd::Shutdown { done_tx: None });
    }
}

// ── Background connection task ──────────────────────────────────────────────

async fn connection_task(
    mut ws: WsStream,
    mut cmd_rx: mpsc::Receiver<HandleCmd>,
    closed: Arc<AtomicBool>,
    url: String,
) {
    let mut next_id: u64 = 1;
    let mut pending: HashMap<u64, Pending> = HashMap::new();
    let mut subs: HashMap<String, SubEntry> = HashMap::new();
    let mut done: Option<oneshot::Sender<()>> = None;
    let mut exit: Option<LiveError> = None;

    while exit.is_none() {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(HandleCmd::Request { method, params, result_tx }) => {
                    let id = next_id;
                    next_id += 1;
                    match send_request(&mut ws, id, &method, params).await {
                        Ok(()) => {
                            pending.insert(id, Pending::Call(result_tx));
                        },
                        Err(e) => {
                            let _ = result_tx.send(Err(e));
                        },
                    }
                },
                Some(HandleCmd::Subscribe { event, method, params, event_tx, result_tx }) => {
                    let id = next_id;
                    next_id += 1;
                    match send_request(&mut ws, id, &method, params).await {
                        Ok(()) => {
                            pending.insert(id, Pending::Subscribe { event, event_tx, result_tx });
                        },
                        Err(e) => {
                            let _ = result_tx.send(Err(e));
                        },
                    }
                },
                Some(HandleCmd::Unsubscribe { method, subscription_id, result_tx }) => {
                    subs.remove(&subscription_id);
                    let id = next_id;
                    next_id += 1;
                    let params = Value::Array(vec![Value::String(subscription_id)]);
                    match send_request(&mut ws, id, &method, params).await {
                        Ok(()) => {
                            pending.insert(id, Pending::Unsubscribe(result_tx));
                        },
                        Err(e) => {
                            let _ = result_tx.send(Err(e));
                        },
                    }
                },
                Some(HandleCmd::Shutdown { done_tx }) => {
                    done = done_tx;
                    let _ = ws.close(None).await;
                    exit = Some(LiveError::Closed);
                },
                None => {
                    let _ = ws.close(None).await;
                    exit = Some(LiveError::Closed);
                },
            },

            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    route_frame(text.as_str(), &mut pending, &mut subs);
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                },
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("[metacheck-fork] Worker at {} closed the connection", url);
                    exit = Some(LiveError::Transport("worker closed the connection".to_string()));
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    log::warn!("[metacheck-fork] WebSocket error from {}: {}", url, e);
                    exit = Some(LiveError::Transport(e.to_string()));
                },
            },
        }
    }

    closed.store(true, Ordering::SeqCst);
    let reason = exit.unwrap_or(LiveError::Closed);
    for (_, entry) in pending.drain() {
        match entry {
            Pending::Call(tx) => {
                let _ = tx.send(Err(reason.clone()));
            },
            Pending::Subscribe { result_tx, .. } => {
                let _ = result_tx.send(Err(reason.clone()));
            },
            Pending::Unsubscribe(tx) => {
                let _ = tx.send(Err(reason.clone()));
            },
        }
    }
    // Dropping the senders ends every event stream.
    subs.clear();
    if let Some(tx) = done {
        let _ = tx.send(());
    }
    log::debug!("[metacheck-fork] Connection task for {} exited", url);
}

async fn send_request(ws: &mut WsStream, id: u64, method: &str, params: Value) -> Result<()> {
    let params = if params.is_null() {
        Value::Array(Vec::new())
    } else {
        params
    };
    let frame = RpcRequest::new(id, method, params).to_json();
    ws.send(Message::Text(frame.into()))
        .await
        .map_err(|e| LiveError::Transport(e.to_string()))
}

fn route_frame(text: &str, pending: &mut HashMap<u64, Pending>, subs: &mut HashMap<String, SubEntry>) {
    match RpcMessage::parse(text) {
        Ok(RpcMessage::Response(reply)) => route_reply(reply, pending, subs),
        Ok(RpcMessage::Notification(notification)) => route_notification(notification, subs),
        Ok(RpcMessage::Other(value)) => {
            log::debug!("[metacheck-fork] Ignoring unroutable frame: {}", value);
        },
        Err(e) => log::warn!("[metacheck-fork] Failed to parse WS message: {}", e),
    }
}

fn route_reply(reply: RpcReply, pending: &mut HashMap<u64, Pending>, subs: &mut HashMap<String, SubEntry>) {
    let Some(entry) = reply.id.as_u64().and_then(|id| pending.remove(&id)) else {
        log::debug!("[metacheck-fork] Reply for unknown request {}", reply.id);
        return;
    };
    let outcome = reply.outcome.map_err(LiveError::Rpc);

    match entry {
        Pending::Call(tx) => {
            let _ = tx.send(outcome);
        },
        Pending::Subscribe {
            event,
            event_tx,
            result_tx,
        } => {
            let result = outcome.and_then(|value| match value {
                Value::String(id) => Ok(id),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(LiveError::InvalidMessage(format!(
                    "subscription id must be a string, got {}",
                    other
                ))),
            });
            if let Ok(id) = &result {
                subs.insert(id.clone(), SubEntry { event, event_tx });
            }
            if result_tx.send(result).is_err() {
                log::debug!("[metacheck-fork] Subscriber went away before confirmation");
            }
        },
        Pending::Unsubscribe(tx) => {
            let _ = tx.send(outcome.map(|_| ()));
        },
    }
}

fn route_notification(notification: RpcNotification, subs: &mut HashMap<String, SubEntry>) {
    let Some(entry) = subs.get(&notification.subscription) else {
        log::debug!(
            "[metacheck-fork] Notification for unknown subscription {}",
            notification.subscription
        );
        return;
    };
    if entry.event != notification.method {
        log::debug!(
            "[metacheck-fork] Unexpected {} on subscription {}",
            notification.method,
            notification.subscription
        );
        return;
    }
    match entry.event_tx.try_send(Ok(notification.result)) {
        Ok(()) => {},
        Err(mpsc::error::TrySendError::Full(_)) => {
            // A gap in the event sequence is unrecoverable for the consumer.
            log::warn!(
                "[metacheck-fork] Event channel full, stopping subscription {}",
                notification.subscription
            );
            if let Some(entry) = subs.remove(&notification.subscription) {
                tokio::spawn(deliver_stop(entry.event_tx));
            }
        },
        Err(mpsc::error::TrySendError::Closed(_)) => {
            log::debug!(
                "[metacheck-fork] Subscription {} receiver dropped",
                notification.subscription
            );
            subs.remove(&notification.subscription);
        },
    }
}

/// Queue a final `stop` behind the buffered events, then drop the sender.
async fn deliver_stop(event_tx: mpsc::Sender<Result<Value>>) {
    let stop = Ok(serde_json::json!({ "event": "stop" }));
    if tokio::time::timeout(STOP_DELIVERY_GRACE, event_tx.send(stop)).await.is_err() {
        log::debug!("[metacheck-fork] Consumer did not drain before stop, closing stream");
    }
}
