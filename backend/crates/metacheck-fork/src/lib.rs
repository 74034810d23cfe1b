//! # metacheck-fork
//!
//! Forked-chain simulation backed by a Chopsticks worker process.
//!
//! - [`ChopsticksEngine`] launches one worker per simulation and tears it
//!   down on [`release_worker`](metacheck_live::SimulationEngine::release_worker)
//! - [`ChopsticksHandle`] speaks JSON-RPC to the worker over a WebSocket

pub mod engine;
pub mod error;
pub mod handle;

pub use engine::{worker_args, ChopsticksEngine};
pub use error::ForkError;
pub use handle::ChopsticksHandle;
