//! # metacheck-commons
//!
//! Types shared by every metacheck crate:
//! - [`Problem`] codes reported by the diagnostic
//! - Connection and subscription identifiers
//! - JSON-RPC 2.0 wire models for the `chainHead_v1` follow protocol
//! - Fork and diagnostic options

pub mod models;
pub mod problem;
pub mod rpc;

pub use models::{BlockRef, ConnectionId, DiagnosticOptions, ForkParams, SubscriptionId, TokenInfo};
pub use problem::Problem;
pub use rpc::{RpcError, RpcMessage, RpcNotification, RpcReply, RpcRequest};
