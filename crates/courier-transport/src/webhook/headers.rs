//! Webhook request headers.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use courier_core::{CourierError, CourierResult, Identity};

/// Identity-correlation headers (`qq`, `X-qq`, `bot`, `X-bot`) stamped on
/// every POST. Header names are case-insensitive and stored lowercase.
pub const IDENTITY_HEADERS: [&str; 4] = ["qq", "x-qq", "bot", "x-bot"];

/// Parses configured static headers.
pub fn static_headers(configured: &HashMap<String, String>) -> CourierResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(configured.len());
    for (name, value) in configured {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CourierError::invalid(format!("invalid webhook header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CourierError::invalid(format!("invalid webhook header value for '{}': {e}", name.as_str())))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Headers naming the bot an event came from.
pub fn identity_headers(identity: Identity) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(IDENTITY_HEADERS.len());
    let value = HeaderValue::from(identity.0);
    for name in IDENTITY_HEADERS {
        headers.insert(HeaderName::from_static(name), value.clone());
    }
    headers
}
