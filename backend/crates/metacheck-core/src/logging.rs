// Logging setup on top of tracing-subscriber.
//
// The crates log through the `log` facade; `tracing_log::LogTracer` routes
// those records into the tracing subscriber installed here.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use metacheck_configs::LoggingSettings;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line text: timestamp LEVEL target - message
    Compact,
    /// Multi-line human readable output
    Pretty,
    /// JSON Lines for structured logging
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Build the `EnvFilter` from the base level, noisy-crate overrides and
/// per-target overrides from config.
pub fn build_env_filter(level: &str, target_levels: &HashMap<String, String>) -> anyhow::Result<EnvFilter> {
    let mut directives = vec![level.to_string()];

    // WebSocket frame tracing drowns out everything else at debug
    let noisy: &[(&str, &str)] = &[
        ("tokio_tungstenite", "warn"),
        ("tungstenite", "warn"),
        ("mio", "warn"),
    ];
    for (target, lvl) in noisy {
        directives.push(format!("{}={}", target, lvl));
    }

    let mut targets: Vec<_> = target_levels.iter().collect();
    targets.sort();
    for (target, lvl) in targets {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("Invalid tracing filter '{}': {}", filter_str, e))
}

fn console_layer(settings: &LoggingSettings) -> anyhow::Result<BoxedLayer> {
    let filter = build_env_filter(&settings.level, &settings.targets)?;
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    Ok(match LogFormat::parse(&settings.format) {
        LogFormat::Json => layer.json().with_span_list(true).with_filter(filter).boxed(),
        LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => layer.compact().with_ansi(true).with_filter(filter).boxed(),
    })
}

fn file_layer(settings: &LoggingSettings, file_path: &str) -> anyhow::Result<BoxedLayer> {
    if let Some(parent) = Path::new(file_path).parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(file_path)?;
    let filter = build_env_filter(&settings.level, &settings.targets)?;
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE);

    Ok(match LogFormat::parse(&settings.format) {
        LogFormat::Json => layer.json().with_span_list(true).with_filter(filter).boxed(),
        _ => layer.with_filter(filter).boxed(),
    })
}

/// Install the global subscriber described by `settings`.
///
/// Console output (when `log_to_console`) and an optional file sink share the
/// same filter. Fails if a global subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if settings.log_to_console {
        layers.push(console_layer(settings)?);
    }
    if let Some(path) = settings.file_path.as_deref() {
        layers.push(file_layer(settings, path)?);
    }

    // ok() in case a bridge is already installed
    tracing_log::LogTracer::init().ok();

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    tracing::trace!(
        "Logging initialized: level={}, format={}, console={}, file={:?}",
        settings.level,
        settings.format,
        settings.log_to_console,
        settings.file_path
    );
    Ok(())
}
