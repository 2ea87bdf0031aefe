//! HTTP-facing error conversion.

use axum::Json;
use axum::response::{IntoResponse, Response};

use courier_core::{CourierError, SessionError, StateCode};

/// A domain error raised by an HTTP handler.
///
/// Rendered as HTTP 200 with a `{"code", "msg"}` body. The original error is
/// attached to the response extensions as [`TracedError`] so the access
/// middleware can log its cause and, when configured, surface it.
#[derive(Debug)]
pub struct HttpError(pub CourierError);

impl From<CourierError> for HttpError {
    fn from(err: CourierError) -> Self {
        Self(err)
    }
}

impl From<SessionError> for HttpError {
    fn from(err: SessionError) -> Self {
        Self(err.into())
    }
}

/// Error carried on a response for the access middleware.
#[derive(Debug, Clone)]
pub struct TracedError(pub CourierError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = Json(StateCode::from(&self.0)).into_response();
        response.extensions_mut().insert(TracedError(self.0));
        response
    }
}

/// Result type for HTTP handlers.
pub type HttpResult<T> = Result<T, HttpError>;
