pub mod defaults;
mod loader;
mod types;

pub use types::{LoggingSettings, MetacheckConfig, TimeoutSettings, WorkerSettings};
