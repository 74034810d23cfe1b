use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration loaded from `metacheck.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetacheckConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "compact", "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// Optional log file; console only when unset
    #[serde(default)]
    pub file_path: Option<String>,
    /// Optional per-target log level overrides
    /// Configure via a TOML table:
    /// [logging.targets]
    /// metacheck_live = "debug"
    /// tokio_tungstenite = "warn"
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_to_console: true,
            file_path: None,
            targets: HashMap::new(),
        }
    }
}

/// How the Chopsticks fork worker is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Executable to launch (default: `npx`)
    #[serde(default = "default_worker_command")]
    pub command: String,
    /// Arguments placed before the generated fork arguments
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
    /// Interface the worker binds its WebSocket server to
    #[serde(default = "default_worker_host")]
    pub host: String,
    /// Runtime log level passed to the worker (0 = silent)
    #[serde(default = "default_runtime_log_level")]
    pub runtime_log_level: u8,
    /// How long to wait for the worker's WebSocket to accept connections
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
            args: default_worker_args(),
            host: default_worker_host(),
            runtime_log_level: default_runtime_log_level(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

impl WorkerSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Per JSON-RPC request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Waiting for the first `initialized` follow event
    #[serde(default = "default_follow_timeout_ms")]
    pub follow_timeout_ms: u64,
    /// Hard bound on waiting for a transaction to be broadcast
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            follow_timeout_ms: default_follow_timeout_ms(),
            broadcast_timeout_ms: default_broadcast_timeout_ms(),
        }
    }
}

impl TimeoutSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn follow_timeout(&self) -> Duration {
        Duration::from_millis(self.follow_timeout_ms)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }
}
