// Default value functions

pub fn default_true() -> bool {
    true
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_worker_command() -> String {
    "npx".to_string()
}

pub fn default_worker_args() -> Vec<String> {
    vec!["--yes".to_string(), "@acala-network/chopsticks@latest".to_string()]
}

pub fn default_worker_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_runtime_log_level() -> u8 {
    0
}

pub fn default_startup_timeout_ms() -> u64 {
    120_000 // forking a remote chain downloads state on first run
}

pub fn default_request_timeout_ms() -> u64 {
    60_000
}

pub fn default_follow_timeout_ms() -> u64 {
    30_000
}

pub fn default_broadcast_timeout_ms() -> u64 {
    60_000
}
