use super::types::MetacheckConfig;
use std::env;
use std::fs;
use std::path::Path;

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const VALID_FORMATS: [&str; 3] = ["compact", "pretty", "json"];

impl MetacheckConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    /// and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text, then apply environment overrides
    /// and validate.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: MetacheckConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    /// Environment overrides apply either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path);
        }
        log::debug!(
            "Config file {} not found, using defaults",
            path.as_ref().display()
        );
        let mut config = MetacheckConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - METACHECK_LOG_LEVEL: Override logging.level
    /// - METACHECK_LOG_FORMAT: Override logging.format
    /// - METACHECK_WORKER_COMMAND: Override worker.command
    /// - METACHECK_WORKER_HOST: Override worker.host
    /// - METACHECK_STARTUP_TIMEOUT_MS: Override worker.startup_timeout_ms
    /// - METACHECK_REQUEST_TIMEOUT_MS: Override timeouts.request_timeout_ms
    /// - METACHECK_BROADCAST_TIMEOUT_MS: Override timeouts.broadcast_timeout_ms
    ///
    /// Environment variables take precedence over file values.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(level) = env::var("METACHECK_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Ok(format) = env::var("METACHECK_LOG_FORMAT") {
            self.logging.format = format.to_lowercase();
        }

        if let Ok(command) = env::var("METACHECK_WORKER_COMMAND") {
            self.worker.command = command;
        }

        if let Ok(host) = env::var("METACHECK_WORKER_HOST") {
            self.worker.host = host;
        }

        if let Some(ms) = parse_ms_var("METACHECK_STARTUP_TIMEOUT_MS")? {
            self.worker.startup_timeout_ms = ms;
        }

        if let Some(ms) = parse_ms_var("METACHECK_REQUEST_TIMEOUT_MS")? {
            self.timeouts.request_timeout_ms = ms;
        }

        if let Some(ms) = parse_ms_var("METACHECK_BROADCAST_TIMEOUT_MS")? {
            self.timeouts.broadcast_timeout_ms = ms;
        }

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ));
        }

        if !VALID_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                VALID_FORMATS.join(", ")
            ));
        }

        for (target, level) in &self.logging.targets {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    VALID_LEVELS.join(", ")
                ));
            }
        }

        if self.worker.command.trim().is_empty() {
            return Err(anyhow::anyhow!("worker.command cannot be empty"));
        }

        if self.worker.host.trim().is_empty() {
            return Err(anyhow::anyhow!("worker.host cannot be empty"));
        }

        let timeouts = [
            ("worker.startup_timeout_ms", self.worker.startup_timeout_ms),
            ("timeouts.request_timeout_ms", self.timeouts.request_timeout_ms),
            ("timeouts.follow_timeout_ms", self.timeouts.follow_timeout_ms),
            ("timeouts.broadcast_timeout_ms", self.timeouts.broadcast_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(anyhow::anyhow!("{} cannot be 0", name));
            }
        }

        Ok(())
    }
}

fn parse_ms_var(name: &str) -> anyhow::Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, raw)),
        Err(_) => Ok(None),
    }
}
