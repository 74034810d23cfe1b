//! ChopsticksHandle against an in-process JSON-RPC WebSocket server that
//! answers the way a Chopsticks worker does.

use futures_util::{SinkExt, StreamExt};
use metacheck_commons::rpc::{FOLLOW_EVENT, FOLLOW_METHOD, UNFOLLOW_METHOD};
use metacheck_fork::ChopsticksHandle;
use metacheck_live::{LiveError, SimulationHandle, DEFAULT_EVENT_CHANNEL_CAPACITY};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Starts a single-connection worker stand-in. Every method it sees is
/// reported on the returned channel.
async fn spawn_worker() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut next_sub = 1;

        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            let request: Value = serde_json::from_str(text.as_str()).unwrap();
            let id = request["id"].clone();
            let method = request["method"].as_str().unwrap().to_string();
            let _ = seen_tx.send(method.clone());

            let mut frames = Vec::new();
            match method.as_str() {
                FOLLOW_METHOD => {
                    let sub = format!("follow-{}", next_sub);
                    next_sub += 1;
                    frames.push(json!({"jsonrpc": "2.0", "id": id, "result": sub}));
                    frames.push(json!({
                        "jsonrpc": "2.0",
                        "method": FOLLOW_EVENT,
                        "params": {"subscription": sub, "result": {"event": "initialized"}},
                    }));
                },
                UNFOLLOW_METHOD => {
                    frames.push(json!({"jsonrpc": "2.0", "id": id, "result": null}));
                },
                "dev_newBlock" => {
                    frames.push(json!({"jsonrpc": "2.0", "id": id, "result": "0xbeef"}));
                },
                "flood" => {
                    let sub = format!("follow-{}", next_sub - 1);
                    for n in 0..DEFAULT_EVENT_CHANNEL_CAPACITY + 8 {
                        frames.push(json!({
                            "jsonrpc": "2.0",
                            "method": FOLLOW_EVENT,
                            "params": {"subscription": sub, "result": {"event": "bestBlockChanged", "n": n}},
                        }));
                    }
                    frames.push(json!({"jsonrpc": "2.0", "id": id, "result": null}));
                },
                "slow" => {},
                "hangup" => {
                    let _ = ws.close(None).await;
                    return;
                },
                _ => {
                    frames.push(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32601, "message": "Method not found"},
                    }));
                },
            }
            for frame in frames {
                ws.send(Message::Text(frame.to_string().into())).await.unwrap();
            }
        }
    });

    (url, seen_rx)
}

#[tokio::test]
async fn test_request_result_and_error() {
    let (url, _seen) = spawn_worker().await;
    let handle = ChopsticksHandle::connect(&url, Duration::from_secs(2)).await.unwrap();

    let block = handle.request("dev_newBlock", json!([])).await.unwrap();
    assert_eq!(block, json!("0xbeef"));

    match handle.request("state_nope", Value::Null).await {
        Err(LiveError::Rpc(error)) => assert_eq!(error.code, -32601),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_subscription_receives_events_until_unsubscribed() {
    let (url, mut seen) = spawn_worker().await;
    let handle = ChopsticksHandle::connect(&url, Duration::from_secs(2)).await.unwrap();

    let mut subscription = handle.subscribe(FOLLOW_EVENT, FOLLOW_METHOD, json!([true])).await.unwrap();
    assert_eq!(subscription.id, "follow-1");

    let event = tokio::time::timeout(Duration::from_secs(2), subscription.events.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event["event"], "initialized");

    handle.unsubscribe(FOLLOW_EVENT, UNFOLLOW_METHOD, &subscription.id).await.unwrap();
    let ended = tokio::time::timeout(Duration::from_secs(2), subscription.events.recv())
        .await
        .unwrap();
    assert!(ended.is_none());

    assert_eq!(seen.recv().await.unwrap(), FOLLOW_METHOD);
    assert_eq!(seen.recv().await.unwrap(), UNFOLLOW_METHOD);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_request_times_out() {
    let (url, _seen) = spawn_worker().await;
    let handle = ChopsticksHandle::connect(&url, Duration::from_millis(100)).await.unwrap();

    let result = handle.request("slow", json!([])).await;
    assert!(matches!(result, Err(LiveError::Timeout(_))));
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_calls_after_close_fail() {
    let (url, _seen) = spawn_worker().await;
    let handle = ChopsticksHandle::connect(&url, Duration::from_secs(2)).await.unwrap();

    handle.close().await.unwrap();
    handle.close().await.unwrap();
    assert!(handle.is_closed());

    let result = handle.request("dev_newBlock", json!([])).await;
    assert!(matches!(result, Err(LiveError::Closed)));
}

#[tokio::test]
async fn test_worker_hangup_ends_streams_and_pending_calls() {
    let (url, _seen) = spawn_worker().await;
    let handle = ChopsticksHandle::connect(&url, Duration::from_secs(2)).await.unwrap();

    let mut subscription = handle.subscribe(FOLLOW_EVENT, FOLLOW_METHOD, json!([false])).await.unwrap();
    let _initialized = subscription.events.recv().await;

    let result = handle.request("hangup", json!([])).await;
    assert!(matches!(result, Err(LiveError::Transport(_)) | Err(LiveError::Closed)));

    let ended = tokio::time::timeout(Duration::from_secs(2), subscription.events.recv())
        .await
        .unwrap();
    assert!(ended.is_none());
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_lagging_subscription_gets_stop_then_ends() {
    let (url, _seen) = spawn_worker().await;
    let handle = ChopsticksHandle::connect(&url, Duration::from_secs(5)).await.unwrap();

    let mut subscription = handle.subscribe(FOLLOW_EVENT, FOLLOW_METHOD, json!([true])).await.unwrap();
    // Every flood frame is routed before the reply, with nobody reading.
    handle.request("flood", json!([])).await.unwrap();

    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), subscription.events.recv())
            .await
            .unwrap();
        match next {
            Some(event) => events.push(event.unwrap()),
            None => break,
        }
    }

    assert_eq!(events.len(), DEFAULT_EVENT_CHANNEL_CAPACITY + 1);
    assert_eq!(events[0]["event"], "initialized");
    assert_eq!(events[1]["n"], 0);
    assert_eq!(events.last().unwrap()["event"], "stop");
    assert!(events[..events.len() - 1].iter().all(|e| e["event"] != "stop"));

    // The connection itself is unaffected.
    assert_eq!(handle.request("dev_newBlock", json!([])).await.unwrap(), json!("0xbeef"));
    handle.close().await.unwrap();
}
