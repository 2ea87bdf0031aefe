//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Names accepted in [`CourierConfig::adapters`].
pub const ADAPTER_NAMES: [&str; 3] = ["http", "ws", "webhook"];

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,

    /// Shared secret clients present to open a session.
    pub verify_key: Option<String>,

    /// Whether the verify key is checked.
    pub enable_verify: bool,

    /// One implicit session bound to the first bot; keys are ignored.
    pub single_mode: bool,

    /// Enables access logging and exposes internal error details.
    pub debug: bool,

    pub session: SessionSettings,

    /// Enabled transport adapters.
    pub adapters: Vec<String>,

    pub http: HttpSettings,
    pub ws: WsSettings,
    pub webhook: WebhookSettings,
    pub hub: HubSettings,
    pub logging: LoggingConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            verify_key: None,
            enable_verify: true,
            single_mode: false,
            debug: false,
            session: SessionSettings::default(),
            adapters: vec!["http".to_string(), "ws".to_string()],
            http: HttpSettings::default(),
            ws: WsSettings::default(),
            webhook: WebhookSettings::default(),
            hub: HubSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CourierConfig {
    /// Returns `true` if `name` is listed in `adapters`.
    pub fn adapter_enabled(&self, name: &str) -> bool {
        self.adapters.iter().any(|a| a == name)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Hosts allowed to make cross-origin requests; `*` allows any, an empty
    /// list disables CORS.
    pub cors: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Upper bound on live sessions; 0 means unlimited.
    pub max_sessions: usize,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 0,
            idle_timeout_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// HTTP polling adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub cache_capacity: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 4096,
        }
    }
}

/// WebSocket adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsSettings {
    pub send_buffer: usize,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self { send_buffer: 256 }
    }
}

/// Webhook adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub destinations: Vec<String>,
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub queue_capacity: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            headers: HashMap::new(),
            timeout_ms: 5000,
            queue_capacity: 1024,
        }
    }
}

/// Event hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Bound on a single adapter delivery.
    pub delivery_timeout_ms: u64,
    /// Deliver every event to every session regardless of bound identity.
    pub broadcast: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 3000,
            broadcast: false,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Per-module levels, e.g. `courier_transport = "debug"`.
    pub filters: HashMap<String, LogLevel>,
    pub thread_ids: bool,
    /// Include file names and line numbers.
    pub file_location: bool,
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    pub span_events: SpanEventConfig,
}
