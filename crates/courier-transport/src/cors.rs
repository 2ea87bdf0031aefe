//! Cross-origin policy for browser clients.
//!
//! Configured hosts are allowed over both `http` and `https`; an entry that
//! already carries a scheme is used as is. `*` allows any origin. Preflight
//! results are cached by browsers for a day.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

const MAX_AGE: Duration = Duration::from_secs(86_400);

/// Builds the CORS layer for `hosts`, or `None` when the list is empty.
pub fn cors_layer(hosts: &[String]) -> Option<CorsLayer> {
    if hosts.is_empty() {
        return None;
    }

    let allow_origin = if hosts.iter().any(|h| h == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(hosts.iter().flat_map(|host| origins(host)))
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::HEAD])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("sessionkey")])
            .max_age(MAX_AGE),
    )
}

fn origins(host: &str) -> Vec<HeaderValue> {
    let candidates = if host.contains("://") {
        vec![host.to_string()]
    } else {
        vec![format!("http://{host}"), format!("https://{host}")]
    };

    candidates
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}
