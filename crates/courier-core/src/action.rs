//! Routing of client actions to the bound bot.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error};

use crate::bot::BoxedBot;
use crate::codec::{ActionEnvelope, Outgoing};
use crate::error::{CourierError, CourierResult, SessionError};
use crate::event::Identity;
use crate::manager::SessionManager;
use crate::session::{Session, SessionState};
use crate::state::StateCode;

/// Gateway version reported by the `about` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolves the bot behind a session and executes client actions on it.
///
/// A few commands are answered by the gateway itself:
///
/// | Command | Needs a bound session |
/// |---|---|
/// | `about` | no |
/// | `botList` | no |
/// | `sessionInfo` | yes |
///
/// Anything else is forwarded to [`Bot::execute`](crate::bot::Bot::execute).
#[derive(Clone)]
pub struct ActionRouter {
    sessions: Arc<SessionManager>,
    expose_internal: bool,
}

impl ActionRouter {
    pub fn new(sessions: Arc<SessionManager>, expose_internal: bool) -> Self {
        Self {
            sessions,
            expose_internal,
        }
    }

    /// The bot a session acts through.
    pub fn resolve_bot(&self, session: &Session) -> CourierResult<BoxedBot> {
        let bots = self.sessions.bots();
        match session.state() {
            SessionState::Authenticated(identity) => {
                bots.get(identity).ok_or(CourierError::NotFound(identity))
            }
            SessionState::Unauthenticated if self.sessions.config().single_mode => {
                bots.first().ok_or(CourierError::NoBot)
            }
            SessionState::Unauthenticated => Err(SessionError::NotVerified.into()),
            SessionState::Closed => Err(SessionError::IllegalSession.into()),
        }
    }

    /// Executes one action for `session`.
    pub async fn execute(
        &self,
        session: &Arc<Session>,
        command: &str,
        sub_command: Option<&str>,
        content: Value,
    ) -> CourierResult<Value> {
        if session.is_closed() {
            return Err(SessionError::IllegalSession.into());
        }
        session.touch();

        match command {
            "about" => Ok(json!({ "version": VERSION })),
            "botList" => Ok(json!(self.sessions.bots().identities())),
            "sessionInfo" => {
                let bot = self.resolve_bot(session)?;
                Ok(json!({
                    "sessionKey": session.key().as_str(),
                    "qq": { "id": bot.identity() },
                }))
            }
            _ => {
                let bot = self.resolve_bot(session)?;
                debug!(
                    session = %session.key(),
                    identity = %bot.identity(),
                    command,
                    sub_command,
                    "Executing action"
                );
                bot.execute(command, sub_command, content).await
            }
        }
    }

    /// Answers an action frame; failures are encoded as a status code.
    pub async fn handle_envelope(&self, session: &Arc<Session>, envelope: ActionEnvelope) -> Outgoing {
        let ActionEnvelope {
            sync_id,
            command,
            sub_command,
            content,
        } = envelope;

        match self
            .execute(session, &command, sub_command.as_deref(), content)
            .await
        {
            Ok(data) => Outgoing::new(sync_id, data),
            Err(e) => Outgoing::new(sync_id, self.state_of(&e).to_value()),
        }
    }

    /// Answers an action frame on the bot behind `identity`, outside any
    /// session.
    pub async fn handle_for_identity(&self, identity: Identity, envelope: ActionEnvelope) -> Outgoing {
        let ActionEnvelope {
            sync_id,
            command,
            sub_command,
            content,
        } = envelope;

        let result = match self.sessions.bots().get(identity) {
            Some(bot) => {
                debug!(identity = %identity, command = %command, "Executing action");
                bot.execute(&command, sub_command.as_deref(), content).await
            }
            None => Err(CourierError::NotFound(identity)),
        };
        match result {
            Ok(data) => Outgoing::new(sync_id, data),
            Err(e) => Outgoing::new(sync_id, self.state_of(&e).to_value()),
        }
    }

    /// Maps an error to its status code, logging internal causes.
    pub fn state_of(&self, err: &CourierError) -> StateCode {
        if err.is_internal() {
            error!(error = %err, "Internal error while handling action");
        }
        StateCode::from_error(err, self.expose_internal)
    }
}
