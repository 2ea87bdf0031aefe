//! Connection bootstrap: verify key, session resolution and failure closes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::http::HeaderMap;
use tracing::debug;

use courier_core::{
    CourierContext, CourierError, CourierResult, Identity, Outgoing, Session, SessionError,
    SessionKey, StateCode,
};

/// Bootstrap parameters, from the query string or the upgrade headers.
#[derive(Debug, Default, Clone)]
pub(super) struct HandshakeParams {
    pub verify_key: Option<String>,
    pub session_key: Option<String>,
    pub qq: Option<String>,
}

impl HandshakeParams {
    pub fn from_request(headers: &HeaderMap, query: &HashMap<String, String>) -> Self {
        let pick = |query_name: &str, header_name: &str| {
            query.get(query_name).cloned().or_else(|| {
                headers
                    .get(header_name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
        };
        Self {
            verify_key: pick("verifyKey", "verifykey"),
            session_key: pick("sessionKey", "sessionkey"),
            qq: pick("qq", "qq"),
        }
    }
}

/// Resolves the session a new connection attaches to.
///
/// Order of checks:
/// 1. verify key (skipped in single mode)
/// 2. single mode: the single session, which must have a bot
/// 3. `qq` without `sessionKey`: a temporary session bound to that bot
/// 4. `sessionKey`: an existing, authenticated session
pub(super) fn resolve(ctx: &CourierContext, params: &HandshakeParams) -> CourierResult<Arc<Session>> {
    if ctx.single_mode() {
        let session = ctx.sessions.create_single_session(true);
        if !session.is_authenticated() {
            return Err(CourierError::NoBot);
        }
        return Ok(session);
    }

    ctx.auth.verify(params.verify_key.as_deref())?;

    let Some(key) = params.session_key.as_deref() else {
        return match params.qq.as_deref() {
            Some(qq) => {
                let identity: Identity = qq.parse()?;
                debug!(identity = %identity, "Creating temporary session for connection");
                ctx.sessions.create_temp_session(identity)
            }
            None => Err(CourierError::invalid("missing sessionKey")),
        };
    };

    let session = ctx.sessions.require(&SessionKey::from(key))?;
    if !session.is_authenticated() {
        return Err(SessionError::NotVerified.into());
    }
    Ok(session)
}

/// Sends a status frame, then closes the socket with the status message.
pub(super) async fn close_with_code(socket: &mut WebSocket, code: StateCode) {
    let frame = Outgoing::new("", code.to_value());
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = socket.send(Message::Text(text.into())).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: code.msg().into_owned().into(),
        })))
        .await;
}
