use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

pub const ENABLED_ENV: &str = "CHAT_STREAM_OBSERVABILITY_ENABLED";
pub const LOG_LEVEL_ENV: &str = "CHAT_STREAM_LOG_LEVEL";
pub const JSON_LOG_PATH_ENV: &str = "CHAT_STREAM_JSON_LOG_PATH";

const DEFAULT_LOG_FILE: &str = "chat-stream.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    /// Compact human-readable lines on stderr.
    Console,
    /// JSON lines appended to a file.
    JsonFile(PathBuf),
}

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    /// Filter directive from `CHAT_STREAM_LOG_LEVEL`; `RUST_LOG` applies otherwise.
    pub level: Option<String>,
    pub target: LogTarget,
}

impl ObservabilitySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_ENV)
            .map(|v| parse_bool(&v).unwrap_or(true))
            .unwrap_or(true);
        let level = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty());
        let target = match lookup(JSON_LOG_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            Some(path) => LogTarget::JsonFile(PathBuf::from(path)),
            None => LogTarget::Console,
        };
        Self {
            enabled,
            level,
            target,
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Installs the global tracing subscriber once per process.
///
/// Environment variables:
/// - `CHAT_STREAM_OBSERVABILITY_ENABLED`: enable/disable flag (default enabled).
/// - `CHAT_STREAM_LOG_LEVEL`: filter override (`info`, `chat_stream=debug`, ...).
/// - `CHAT_STREAM_JSON_LOG_PATH`: if set, logs are JSONL in that file;
///   otherwise compact console output on stderr.
/// - `RUST_LOG`: fallback filter.
///
/// Later calls, or a subscriber installed elsewhere first, are no-ops.
pub fn init_observability() {
    INIT.get_or_init(|| install(&ObservabilitySettings::from_env()));
}

fn install(settings: &ObservabilitySettings) {
    if !settings.enabled {
        return;
    }
    let env_filter = settings.env_filter();
    match &settings.target {
        LogTarget::JsonFile(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_LOG_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        }
        LogTarget::Console => {
            // stdout carries streamed answer text in the CLI.
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    }
}
