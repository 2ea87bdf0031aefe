//! Per-connection loop.
//!
//! The loop waits only on the socket, the outbound queue and the connection's
//! close signal. The close signal fires when a newer connection takes the
//! channel slot or when the session is closed. Client actions run as tasks
//! owned by the loop and answer through the outbound queue; they are aborted
//! when the loop ends.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use courier_core::{
    ActionEnvelope, ChannelKind, ConnectionHandle, CourierContext, CourierError, Outgoing, Session,
    StateCode,
};

use super::handshake::close_with_code;

/// Serves one registered connection until it ends, then cleans up.
pub(super) async fn run(
    ctx: CourierContext,
    session: Arc<Session>,
    kind: ChannelKind,
    send_buffer: usize,
    mut socket: WebSocket,
) {
    let guard = session.acquire();
    let (handle, mut outbound) =
        ConnectionHandle::channel(uuid::Uuid::new_v4().simple().to_string(), send_buffer);

    if let Err(e) = session.register_channel(kind, handle.clone()) {
        close_with_code(&mut socket, StateCode::from(CourierError::from(e))).await;
        drop(guard);
        close_if_unused(&ctx, &session);
        return;
    }

    info!(
        session = %session.key(),
        channel = %kind,
        connection = %handle.id,
        "WebSocket connection established"
    );

    let (mut sink, mut stream) = socket.split();

    let verified = Outgoing::new("", json!({ "code": 0, "session": session.key().as_str() }));
    let handshake_ok = match ctx.codec.encode_envelope(&verified) {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(_) => false,
    };

    let mut actions = JoinSet::new();
    if handshake_ok {
        loop {
            tokio::select! {
                () = handle.closed() => {
                    debug!(connection = %handle.id, "Connection closed by server");
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "closed".into(),
                        })))
                        .await;
                    break;
                }
                frame = outbound.recv() => {
                    let Some(text) = frame else { break };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        warn!(connection = %handle.id, "Failed to send frame, connection closed");
                        break;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => match ctx.codec.decode_action(text.as_str()) {
                        Ok(envelope) => {
                            let reply = answer(ctx.clone(), session.clone(), handle.clone(), envelope);
                            actions.spawn(reply);
                        }
                        Err(e) => {
                            let reply = Outgoing::new("", ctx.state_of(&e).to_value());
                            if let Ok(text) = ctx.codec.encode_envelope(&reply)
                                && let Err(e) = handle.try_send(text)
                            {
                                warn!(connection = %handle.id, error = %e, "Dropped action reply");
                            }
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection = %handle.id, "Connection closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection = %handle.id, error = %e, "WebSocket error");
                        break;
                    }
                },
                Some(_) = actions.join_next(), if !actions.is_empty() => {}
            }
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    actions.abort_all();
    session.release_channel(kind, &handle);
    handle.close();
    drop(guard);
    close_if_unused(&ctx, &session);
    info!(session = %session.key(), channel = %kind, connection = %handle.id, "WebSocket connection closed");
}

/// Executes one action and queues its reply on the connection.
async fn answer(
    ctx: CourierContext,
    session: Arc<Session>,
    handle: ConnectionHandle,
    envelope: ActionEnvelope,
) {
    let reply = ctx.actions.handle_envelope(&session, envelope).await;
    match ctx.codec.encode_envelope(&reply) {
        Ok(text) => {
            if handle.send(text).await.is_err() {
                debug!(connection = %handle.id, "Connection gone before action reply");
            }
        }
        Err(e) => warn!(connection = %handle.id, error = %e, "Failed to encode action reply"),
    }
}

/// Temporary sessions live as long as their connections.
fn close_if_unused(ctx: &CourierContext, session: &Session) {
    if session.is_temporary() && session.ref_count() == 0 {
        debug!(session = %session.key(), "Closing temporary session");
        ctx.sessions.close_session(session.key());
    }
}
