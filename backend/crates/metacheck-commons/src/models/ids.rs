use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one logical connection against a subscription multiplexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    #[inline]
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self(unique_id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol-level subscription identifier handed to a consumer in the
/// `chainHead_v1_follow` confirmation.
///
/// Opaque to consumers; distinct from the native identifier held by the
/// simulation handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse from string format
    pub fn from_string(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("SubscriptionId cannot be empty".to_string());
        }
        Ok(Self(s.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
