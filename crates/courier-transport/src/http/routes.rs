//! HTTP routes.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /verify` | verify key → new session key |
//! | `POST /bind` | bind a session to a bot |
//! | `POST /release` | close a session |
//! | `GET /sessionInfo`, `GET /about` | session and gateway info |
//! | `GET /fetchMessage`, `/fetchLatestMessage` | drain cached events |
//! | `GET /peekMessage`, `/peekLatestMessage` | read cached events |
//! | `GET /countMessage` | number of cached events |
//! | `POST /` | action envelope |
//! | `GET /{command}`, `POST /{command}` | any other action |
//!
//! The session key is read from the `sessionKey` header, query parameter or
//! body field, in that order. In single mode it is ignored.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value, json};

use courier_core::{
    ActionEnvelope, CourierContext, CourierError, Identity, Session, SessionError, SessionKey,
    StateCode, VERSION,
};

use super::{HttpAdapter, PollOrder};
use crate::error::HttpResult;

const SESSION_KEY: &str = "sessionKey";
const SUB_COMMAND: &str = "subCommand";
const DEFAULT_COUNT: usize = 10;

type Params = HashMap<String, String>;

#[derive(Clone)]
struct HttpState {
    ctx: CourierContext,
    adapter: Arc<HttpAdapter>,
}

/// Builds the polling and action routes.
pub fn router(ctx: CourierContext, adapter: Arc<HttpAdapter>) -> Router {
    Router::new()
        .route("/", post(envelope))
        .route("/verify", post(verify))
        .route("/bind", post(bind))
        .route("/release", post(release))
        .route("/about", get(about))
        .route("/sessionInfo", get(session_info))
        .route("/fetchMessage", get(fetch_message))
        .route("/fetchLatestMessage", get(fetch_latest_message))
        .route("/peekMessage", get(peek_message))
        .route("/peekLatestMessage", get(peek_latest_message))
        .route("/countMessage", get(count_message))
        .route("/{command}", get(get_command).post(post_command))
        .with_state(HttpState { ctx, adapter })
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn success(data: Value) -> Json<Value> {
    Json(json!({ "code": 0, "msg": "success", "data": data }))
}

fn state(code: StateCode) -> Json<Value> {
    Json(code.to_value())
}

fn parse_body(body: &Bytes) -> HttpResult<Value> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| CourierError::invalid(format!("malformed JSON body: {e}")).into())
}

fn body_str<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

fn body_identity(body: &Value) -> HttpResult<Identity> {
    match body.get("qq") {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Identity)
            .ok_or_else(|| CourierError::invalid("qq out of range").into()),
        Some(Value::String(s)) => Ok(s.parse()?),
        _ => Err(CourierError::invalid("missing qq").into()),
    }
}

fn session_key(headers: &HeaderMap, params: &Params, body: Option<&Value>) -> Option<SessionKey> {
    headers
        .get("sessionkey")
        .and_then(|v| v.to_str().ok())
        .map(SessionKey::from)
        .or_else(|| params.get(SESSION_KEY).map(|k| SessionKey::from(k.as_str())))
        .or_else(|| body.and_then(|b| body_str(b, SESSION_KEY)).map(SessionKey::from))
}

/// Resolves the caller's session; in single mode this is always the single session.
fn resolve_session(ctx: &CourierContext, key: Option<SessionKey>) -> HttpResult<Arc<Session>> {
    if ctx.single_mode() {
        return Ok(ctx.sessions.create_single_session(true));
    }
    let key = key.ok_or(SessionError::IllegalSession)?;
    Ok(ctx.sessions.require(&key)?)
}

/// Like [`resolve_session`], additionally requiring a bound session.
fn resolve_verified(ctx: &CourierContext, key: Option<SessionKey>) -> HttpResult<Arc<Session>> {
    let session = resolve_session(ctx, key)?;
    if !ctx.single_mode() && !session.is_authenticated() {
        return Err(SessionError::NotVerified.into());
    }
    Ok(session)
}

fn count_param(params: &Params) -> HttpResult<usize> {
    match params.get("count") {
        Some(raw) => raw
            .parse()
            .map_err(|_| CourierError::invalid(format!("invalid count '{raw}'")).into()),
        None => Ok(DEFAULT_COUNT),
    }
}

/// Turns query parameters into an action payload, coercing scalars.
fn query_content(params: &Params) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .filter(|(k, _)| k.as_str() != SESSION_KEY && k.as_str() != SUB_COMMAND)
        .map(|(k, v)| {
            let value = if let Ok(n) = v.parse::<i64>() {
                json!(n)
            } else if let Ok(b) = v.parse::<bool>() {
                json!(b)
            } else {
                json!(v)
            };
            (k.clone(), value)
        })
        .collect();
    Value::Object(map)
}

// ─── Session routes ───────────────────────────────────────────────────────────

async fn verify(State(s): State<HttpState>, body: Bytes) -> HttpResult<Json<Value>> {
    let body = parse_body(&body)?;
    let session = if s.ctx.single_mode() {
        s.ctx.sessions.create_single_session(true)
    } else {
        s.ctx.auth.verify(body_str(&body, "verifyKey"))?;
        s.ctx.sessions.create_session()?
    };
    Ok(Json(json!({ "code": 0, "session": session.key().as_str() })))
}

async fn bind(State(s): State<HttpState>, headers: HeaderMap, body: Bytes) -> HttpResult<Json<Value>> {
    if s.ctx.single_mode() {
        return Ok(state(StateCode::Success));
    }
    let body = parse_body(&body)?;
    let key = session_key(&headers, &Params::new(), Some(&body)).ok_or(SessionError::IllegalSession)?;
    let identity = body_identity(&body)?;
    s.ctx.sessions.authenticate(&key, identity)?;
    Ok(state(StateCode::Success))
}

async fn release(State(s): State<HttpState>, headers: HeaderMap, body: Bytes) -> HttpResult<Json<Value>> {
    if s.ctx.single_mode() {
        return Ok(state(StateCode::Success));
    }
    let body = parse_body(&body)?;
    let key = session_key(&headers, &Params::new(), Some(&body)).ok_or(SessionError::IllegalSession)?;
    let session = s.ctx.sessions.require(&key)?;

    if let (Some(bound), Ok(claimed)) = (session.identity(), body_identity(&body))
        && bound != claimed
    {
        return Err(CourierError::NotFound(claimed).into());
    }

    s.ctx.sessions.close_session(&key);
    Ok(state(StateCode::Success))
}

async fn about() -> Json<Value> {
    success(json!({ "version": VERSION }))
}

async fn session_info(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    let session = resolve_session(&s.ctx, session_key(&headers, &params, None))?;
    let data = s.ctx.actions.execute(&session, "sessionInfo", None, Value::Null).await?;
    Ok(success(data))
}

// ─── Poll routes ──────────────────────────────────────────────────────────────

async fn poll(
    s: &HttpState,
    headers: &HeaderMap,
    params: &Params,
    order: PollOrder,
    remove: bool,
) -> HttpResult<Json<Value>> {
    let session = resolve_verified(&s.ctx, session_key(headers, params, None))?;
    let count = count_param(params)?;
    let events = if remove {
        s.adapter.fetch(session.key(), count, order)
    } else {
        s.adapter.peek(session.key(), count, order)
    };
    Ok(success(Value::Array(events)))
}

async fn fetch_message(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    poll(&s, &headers, &params, PollOrder::Oldest, true).await
}

async fn fetch_latest_message(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    poll(&s, &headers, &params, PollOrder::Newest, true).await
}

async fn peek_message(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    poll(&s, &headers, &params, PollOrder::Oldest, false).await
}

async fn peek_latest_message(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    poll(&s, &headers, &params, PollOrder::Newest, false).await
}

async fn count_message(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    let session = resolve_verified(&s.ctx, session_key(&headers, &params, None))?;
    Ok(success(json!(s.adapter.count(session.key()))))
}

// ─── Action routes ────────────────────────────────────────────────────────────

async fn envelope(
    State(s): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    body: Bytes,
) -> HttpResult<Json<Value>> {
    let value = parse_body(&body)?;
    let session = resolve_session(&s.ctx, session_key(&headers, &params, Some(&value)))?;
    let text = std::str::from_utf8(&body)
        .map_err(|_| CourierError::invalid("action envelope is not UTF-8"))?;
    let envelope = s.ctx.codec.decode_action(text)?;
    let reply = s.ctx.actions.handle_envelope(&session, envelope).await;
    Ok(Json(json!(reply)))
}

async fn get_command(
    State(s): State<HttpState>,
    Path(command): Path<String>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> HttpResult<Json<Value>> {
    let session = resolve_session(&s.ctx, session_key(&headers, &params, None))?;
    let data = s
        .ctx
        .actions
        .execute(
            &session,
            &command,
            params.get(SUB_COMMAND).map(String::as_str),
            query_content(&params),
        )
        .await?;
    Ok(success(data))
}

async fn post_command(
    State(s): State<HttpState>,
    Path(command): Path<String>,
    headers: HeaderMap,
    Query(params): Query<Params>,
    body: Bytes,
) -> HttpResult<Json<Value>> {
    let content = parse_body(&body)?;
    let session = resolve_session(&s.ctx, session_key(&headers, &params, Some(&content)))?;
    let data = s
        .ctx
        .actions
        .execute(
            &session,
            &command,
            params.get(SUB_COMMAND).map(String::as_str),
            content,
        )
        .await?;
    Ok(success(data))
}
