//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{ADAPTER_NAMES, CourierConfig, WebhookSettings};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_server(config)?;
    validate_auth(config)?;
    validate_adapters(config)?;
    validate_limits(config)?;
    if config.adapter_enabled("webhook") {
        validate_webhook(&config.webhook)?;
    }
    Ok(())
}

fn validate_server(config: &CourierConfig) -> ConfigResult<()> {
    if config.server.host.trim().is_empty() {
        return Err(ConfigError::missing_field("server.host"));
    }
    Ok(())
}

/// Verification without a key would reject every client.
fn validate_auth(config: &CourierConfig) -> ConfigResult<()> {
    if config.single_mode || !config.enable_verify {
        return Ok(());
    }
    match config.verify_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(()),
        _ => Err(ConfigError::missing_field("verify_key")),
    }
}

fn validate_adapters(config: &CourierConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in &config.adapters {
        if !ADAPTER_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::InvalidAdapter(name.clone()));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::DuplicateAdapter(name.clone()));
        }
    }
    Ok(())
}

fn validate_limits(config: &CourierConfig) -> ConfigResult<()> {
    let positive = [
        ("session.idle_timeout_secs", config.session.idle_timeout_secs as usize),
        ("session.sweep_interval_secs", config.session.sweep_interval_secs as usize),
        ("http.cache_capacity", config.http.cache_capacity),
        ("ws.send_buffer", config.ws.send_buffer),
        ("webhook.timeout_ms", config.webhook.timeout_ms as usize),
        ("webhook.queue_capacity", config.webhook.queue_capacity),
        ("hub.delivery_timeout_ms", config.hub.delivery_timeout_ms as usize),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(ConfigError::validation(format!("{field} must be greater than 0")));
        }
    }
    Ok(())
}

fn validate_webhook(webhook: &WebhookSettings) -> ConfigResult<()> {
    if webhook.destinations.is_empty() {
        return Err(ConfigError::missing_field("webhook.destinations"));
    }
    for url in &webhook.destinations {
        validate_url(url)?;
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    const SCHEMES: [&str; 2] = ["http://", "https://"];

    if !SCHEMES.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {SCHEMES:?}"),
        ));
    }
    if url.len() <= url.find("://").map_or(0, |i| i + 3) {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }
    Ok(())
}
