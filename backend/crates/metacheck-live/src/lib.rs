//! # metacheck-live
//!
//! Subscription multiplexing between generic chain clients and a forked-chain
//! simulation.
//!
//! Consumers speak the standardized `chainHead_v1` follow protocol as JSON-RPC
//! text frames. The [`SubscriptionMultiplexer`] translates those frames into
//! native subscribe/unsubscribe/request calls against one shared
//! [`SimulationHandle`], and reference-counts [`LogicalConnection`]s so the
//! handle and its worker are torn down exactly when the last connection goes
//! away.
//!
//! ## Module Structure
//!
//! - [`simulation`]: the simulation engine/handle seam
//! - [`connection`]: per-connection subscription records
//! - [`multiplexer`]: the multiplexer and logical connections
//! - [`error`]: error types

pub mod connection;
pub mod error;
pub mod multiplexer;
pub mod simulation;

pub use error::{LiveError, Result};
pub use multiplexer::{LogicalConnection, SubscriptionMultiplexer};
pub use simulation::{
    NativeSubscription, SimulationEngine, SimulationHandle, DEFAULT_EVENT_CHANNEL_CAPACITY,
};
