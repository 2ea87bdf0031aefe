//! WebSocket routes: `GET /message`, `GET /event`, `GET /all`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use tracing::{debug, warn};

use courier_core::{ChannelKind, CourierContext};

use super::WsAdapter;
use super::channel;
use super::handshake::{self, HandshakeParams};

#[derive(Clone)]
struct WsState {
    ctx: CourierContext,
    adapter: Arc<WsAdapter>,
}

/// Builds the push channel routes.
pub fn router(ctx: CourierContext, adapter: Arc<WsAdapter>) -> Router {
    Router::new()
        .route("/message", get(message_channel))
        .route("/event", get(event_channel))
        .route("/all", get(all_channel))
        .with_state(WsState { ctx, adapter })
}

async fn message_channel(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    upgrade(ws, state, ChannelKind::Message, &headers, &query)
}

async fn event_channel(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    upgrade(ws, state, ChannelKind::Event, &headers, &query)
}

async fn all_channel(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    upgrade(ws, state, ChannelKind::All, &headers, &query)
}

/// Upgrades first, then runs the handshake so failures can be reported with
/// a status frame and a close reason.
fn upgrade(
    ws: WebSocketUpgrade,
    state: WsState,
    kind: ChannelKind,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Response {
    let params = HandshakeParams::from_request(headers, query);
    debug!(channel = %kind, "New WebSocket connection request");

    ws.on_upgrade(move |mut socket| async move {
        match handshake::resolve(&state.ctx, &params) {
            Ok(session) => {
                let buffer = state.adapter.config().send_buffer;
                channel::run(state.ctx, session, kind, buffer, socket).await;
            }
            Err(e) => {
                warn!(channel = %kind, error = %e, "WebSocket handshake rejected");
                let code = state.ctx.state_of(&e);
                handshake::close_with_code(&mut socket, code).await;
            }
        }
    })
}
