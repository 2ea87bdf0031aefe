//! Shared state handed to every transport.

use std::sync::Arc;

use crate::action::ActionRouter;
use crate::auth::AuthGate;
use crate::codec::BoxedCodec;
use crate::error::CourierError;
use crate::manager::SessionManager;
use crate::state::StateCode;

/// Everything a transport needs to serve clients.
///
/// Built once by the runtime and cloned into each adapter and route; all
/// fields are cheap handles.
#[derive(Clone)]
pub struct CourierContext {
    pub sessions: Arc<SessionManager>,
    pub auth: AuthGate,
    pub codec: BoxedCodec,
    pub actions: ActionRouter,
    /// Surface internal error causes to clients and enable access logging.
    pub debug: bool,
}

impl CourierContext {
    pub fn new(sessions: Arc<SessionManager>, auth: AuthGate, codec: BoxedCodec, debug: bool) -> Self {
        let actions = ActionRouter::new(sessions.clone(), debug);
        Self {
            sessions,
            auth,
            codec,
            actions,
            debug,
        }
    }

    pub fn single_mode(&self) -> bool {
        self.sessions.config().single_mode
    }

    /// Maps an error to its client-facing status code.
    pub fn state_of(&self, err: &CourierError) -> StateCode {
        self.actions.state_of(err)
    }
}
