//! Unified error types for the Courier core.
//!
//! Every failure a client can observe is one of these variants. Transports turn
//! them into a [`StateCode`](crate::state::StateCode) at their boundary; the
//! event hub catches them per delivery and only logs them.

use thiserror::Error;

use crate::event::Identity;

// =============================================================================
// Session Errors
// =============================================================================

/// Errors raised by session lookup and lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session key is unknown, or the session was already closed.
    #[error("illegal session")]
    IllegalSession,

    /// The session exists but has not been bound to a bot yet.
    #[error("session is not verified")]
    NotVerified,

    /// The session is already bound; re-authentication is rejected.
    #[error("session is already authenticated")]
    AlreadyAuthenticated,

    /// The configured maximum number of concurrent sessions is reached.
    #[error("session capacity of {limit} reached")]
    CapacityExceeded {
        /// The configured limit.
        limit: usize,
    },
}

// =============================================================================
// Courier Errors
// =============================================================================

/// Errors that can occur while serving a client or delivering an event.
#[derive(Debug, Clone, Error)]
pub enum CourierError {
    /// Missing or mismatching shared secret.
    #[error("verify key mismatch")]
    AuthFailure,

    /// Unknown, illegal or unauthenticated session.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No bot exists for the requested identity.
    #[error("no bot found for identity {0}")]
    NotFound(Identity),

    /// No bot is available at all (single mode without any registered bot).
    #[error("no bot available")]
    NoBot,

    /// Malformed action request.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The codec met a discriminator outside the closed event set.
    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// The requested command is not handled by the gateway nor the bot.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    /// Adapter-level delivery failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Anything unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Creates an invalid parameter error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns `true` for errors whose cause should be logged server-side.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Transport(_))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for Courier operations.
pub type CourierResult<T> = Result<T, CourierError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
