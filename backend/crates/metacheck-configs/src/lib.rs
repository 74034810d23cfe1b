//! metacheck-configs
//!
//! Configuration types and loader for metacheck.

pub mod config;

pub use config::defaults;
pub use config::*;
