//! JSON-RPC 2.0 wire models for the `chainHead_v1` follow protocol.
//!
//! Outbound frames (replies and notifications) are built here so that the
//! multiplexer and the Chopsticks transport frame messages identically.
//! Inbound frames are classified with [`RpcMessage::parse`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Starts following the chain head.
pub const FOLLOW_METHOD: &str = "chainHead_v1_follow";
/// Stops a follow subscription.
pub const UNFOLLOW_METHOD: &str = "chainHead_v1_unfollow";
/// Notification method carrying follow events.
pub const FOLLOW_EVENT: &str = "chainHead_v1_followEvent";

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// A JSON-RPC request as sent by a consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// `Value::Null` when the request carries no id
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }

    pub fn to_json(&self) -> String {
        json!({
            "jsonrpc": self.jsonrpc,
            "id": self.id,
            "method": self.method,
            "params": self.params,
        })
        .to_string()
    }

    /// First positional parameter as a string, if any.
    pub fn first_param_str(&self) -> Option<&str> {
        match &self.params {
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::PARSE_ERROR, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Reply to a request: either a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    pub id: Value,
    pub outcome: Result<Value, RpcError>,
}

impl RpcReply {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    pub fn to_json(&self) -> String {
        match &self.outcome {
            Ok(result) => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": self.id,
                "result": result,
            }),
            Err(error) => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": self.id,
                "error": error,
            }),
        }
        .to_string()
    }
}

/// Subscription notification: `{jsonrpc, method, params: {subscription, result}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcNotification {
    pub method: String,
    pub subscription: String,
    pub result: Value,
}

impl RpcNotification {
    pub fn follow_event(subscription: impl Into<String>, result: Value) -> Self {
        Self {
            method: FOLLOW_EVENT.to_string(),
            subscription: subscription.into(),
            result,
        }
    }

    pub fn to_json(&self) -> String {
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": self.method,
            "params": {
                "subscription": self.subscription,
                "result": self.result,
            },
        })
        .to_string()
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Reply to a request previously sent with `id`.
    Response(RpcReply),
    /// Subscription notification.
    Notification(RpcNotification),
    /// Anything else: requests, notifications without a subscription, etc.
    Other(Value),
}

impl RpcMessage {
    /// Parse and classify one text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(value))
    }

    pub fn classify(value: Value) -> Self {
        let mut map: Map<String, Value> = match value {
            Value::Object(map) => map,
            other => return RpcMessage::Other(other),
        };

        if let Some(Value::String(method)) = map.get("method").cloned() {
            let subscription = map
                .get("params")
                .and_then(|p| p.get("subscription"))
                .and_then(subscription_key);
            if let Some(subscription) = subscription {
                let result = map
                    .get_mut("params")
                    .and_then(|p| p.get_mut("result"))
                    .map(Value::take)
                    .unwrap_or(Value::Null);
                return RpcMessage::Notification(RpcNotification {
                    method,
                    subscription,
                    result,
                });
            }
            return RpcMessage::Other(Value::Object(map));
        }

        let has_outcome = map.contains_key("result") || map.contains_key("error");
        match map.get("id") {
            Some(id) if !id.is_null() && has_outcome => {
                let id = id.clone();
                let outcome = match map.remove("error") {
                    Some(error) => Err(serde_json::from_value::<RpcError>(error.clone())
                        .unwrap_or_else(|_| RpcError::internal(error.to_string()))),
                    None => Ok(map.remove("result").unwrap_or(Value::Null)),
                };
                RpcMessage::Response(RpcReply { id, outcome })
            },
            _ => RpcMessage::Other(Value::Object(map)),
        }
    }
}

/// Subscription ids are strings on the wire, but some servers use numbers.
fn subscription_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Encode bytes as a `0x`-prefixed hex string.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode a hex string, with or without `0x` prefix.
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.trim_start_matches("0x"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"method":"chainHead_v1_follow"}"#).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert!(req.id.is_null());
        assert!(req.params.is_null());
        assert_eq!(req.first_param_str(), None);
    }

    #[test]
    fn test_reply_framing() {
        let ok: Value = serde_json::from_str(&RpcReply::success(json!(3), json!("sub")).to_json()).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 3, "result": "sub"}));

        let err: Value = serde_json::from_str(
            &RpcReply::failure(json!(4), RpcError::new(-32000, "boom")).to_json(),
        )
        .unwrap();
        assert_eq!(err["error"]["code"], json!(-32000));
        assert_eq!(err["error"]["message"], json!("boom"));
        assert!(err.get("result").is_none());
    }

    #[test]
    fn test_classify_null_result_is_response() {
        let msg = RpcMessage::parse(r#"{"jsonrpc":"2.0","id":9,"result":null}"#).unwrap();
        assert_eq!(msg, RpcMessage::Response(RpcReply::success(json!(9), Value::Null)));
    }

    #[test]
    fn test_classify_notification() {
        let frame = RpcNotification::follow_event("abc", json!({"event": "initialized"})).to_json();
        match RpcMessage::parse(&frame).unwrap() {
            RpcMessage::Notification(n) => {
                assert_eq!(n.method, FOLLOW_EVENT);
                assert_eq!(n.subscription, "abc");
                assert_eq!(n.result["event"], "initialized");
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let msg =
            RpcMessage::parse(r#"{"jsonrpc":"2.0","id":"x","error":{"code":1,"message":"no"}}"#)
                .unwrap();
        match msg {
            RpcMessage::Response(reply) => {
                assert_eq!(reply.id, json!("x"));
                assert_eq!(reply.outcome.unwrap_err().message, "no");
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex(&[0xde, 0xad]), "0xdead");
        assert_eq!(from_hex("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(from_hex("beef").unwrap(), vec![0xbe, 0xef]);
    }
}
