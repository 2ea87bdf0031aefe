//! Configuration for the Courier runtime.
//!
//! Layered loading (defaults, files, environment) and validation of server,
//! session, adapter and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ADAPTER_NAMES, CourierConfig, HttpSettings, HubSettings, LogFormat, LogLevel, LogOutput,
    LogRotation, LoggingConfig, ServerConfig, SessionSettings, SpanEventConfig, WebhookSettings,
    WsSettings,
};
pub use validation::validate_config;
