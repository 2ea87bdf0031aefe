//! Request middleware wrapping every route.
//!
//! [`AccessLayer`] is a tower [`Layer`] applied to the whole router:
//!
//! 1. Buffers the request body once (POST, non-multipart) so it can be both
//!    logged and parsed downstream.
//! 2. Logs `requesting [version] [method] uri` and the parameters when access
//!    logging is enabled.
//! 3. Runs the handler, then inspects the response for a [`TracedError`]:
//!    internal errors are logged with their cause and, when configured, the
//!    cause replaces the generic message sent to the client.

use std::task::{Context, Poll};

use axum::Json;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{Method, Request, header};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{debug, error};

use courier_core::{CourierError, StateCode};

use crate::error::{HttpError, TracedError};

/// Largest request body buffered by the middleware.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Creates the access middleware layer.
///
/// # Example
///
/// ```rust,ignore
/// let router = routes.layer(AccessLayer::new(config.debug, config.debug));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLayer {
    log_access: bool,
    expose_internal: bool,
}

impl AccessLayer {
    pub fn new(log_access: bool, expose_internal: bool) -> Self {
        Self {
            log_access,
            expose_internal,
        }
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessService<S>;

    fn layer(&self, inner: S) -> AccessService<S> {
        AccessService {
            log_access: self.log_access,
            expose_internal: self.expose_internal,
            inner,
        }
    }
}

/// The [`Service`] produced by [`AccessLayer`].
#[derive(Debug, Clone)]
pub struct AccessService<S> {
    log_access: bool,
    expose_internal: bool,
    inner: S,
}

impl<S> Service<Request<Body>> for AccessService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let log_access = self.log_access;
        let expose_internal = self.expose_internal;

        Box::pin(async move {
            let (request, body) = match buffer_body(request).await {
                Ok(buffered) => buffered,
                Err(e) => return Ok(HttpError(e).into_response()),
            };

            if log_access {
                log_request(&request, body.as_ref());
            }

            let response = inner.call(request).await?;
            Ok(trace_error(response, expose_internal))
        })
    }
}

/// Reads the body of POST non-multipart requests into memory.
async fn buffer_body(request: Request<Body>) -> Result<(Request<Body>, Option<Bytes>), CourierError> {
    if request.method() != Method::POST || is_multipart(&request) {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| CourierError::invalid(format!("failed to read request body: {e}")))?;
    let request = Request::from_parts(parts, Body::from(bytes.clone()));
    Ok((request, Some(bytes)))
}

fn is_multipart(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/"))
}

fn log_request(request: &Request<Body>, body: Option<&Bytes>) {
    debug!(
        "requesting [{:?}] [{}] {}",
        request.version(),
        request.method(),
        request.uri()
    );
    match body {
        Some(body) if !body.is_empty() => {
            debug!("with {}", String::from_utf8_lossy(body));
        }
        _ => {
            if let Some(query) = request.uri().query() {
                debug!("with {query}");
            }
        }
    }
}

/// Logs the cause of internal errors and optionally surfaces it.
fn trace_error(response: Response, expose_internal: bool) -> Response {
    let Some(TracedError(err)) = response.extensions().get::<TracedError>().cloned() else {
        return response;
    };

    if !err.is_internal() {
        return response;
    }

    error!(error = %err, "Internal error while handling request");
    if expose_internal {
        Json(StateCode::from_error(&err, true)).into_response()
    } else {
        response
    }
}
