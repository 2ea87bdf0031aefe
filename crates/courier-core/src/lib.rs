//! # Courier Core
//!
//! Session lifecycle and event fan-out engine of the Courier bot gateway.
//!
//! Courier exposes a bot's events and actions to external client programs
//! over several wire transports. This crate holds everything that does not
//! depend on a particular transport:
//!
//! - **Sessions**: [`Session`], [`SessionKey`] and the [`SessionManager`]
//!   that owns the session table
//! - **Authentication**: the shared-secret [`AuthGate`]
//! - **Events**: the closed [`EventKind`] set, [`BotEvent`] and the [`Codec`]
//! - **Fan-out**: the [`TransportAdapter`] contract and the [`EventHub`]
//! - **Actions**: the [`Bot`]/[`BotRegistry`] seam and the [`ActionRouter`]
//! - **Errors**: [`CourierError`] and the wire-level [`StateCode`]
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐  BotEvent  ┌──────────┐  per session × adapter  ┌───────────┐
//! │ event      │───────────▶│ EventHub │────────────────────────▶│ adapters  │──▶ clients
//! │ source     │            └──────────┘                         └───────────┘
//! │ (bots)     │◀──────────── ActionRouter ◀──────────── action envelopes ◀─── clients
//! └────────────┘
//! ```

pub mod action;
pub mod adapter;
pub mod auth;
pub mod bot;
pub mod codec;
pub mod connection;
pub mod context;
pub mod error;
pub mod event;
pub mod hub;
pub mod manager;
pub mod session;
pub mod state;

pub use action::{ActionRouter, VERSION};
pub use adapter::{BoxedAdapter, DeliveryOutcome, TransportAdapter};
pub use auth::AuthGate;
pub use bot::{Bot, BotRegistry, BoxedBot, StaticBotRegistry};
pub use codec::{ActionEnvelope, BoxedCodec, Codec, EVENT_SYNC_ID, JsonCodec, Outgoing};
pub use connection::ConnectionHandle;
pub use context::CourierContext;
pub use error::{CourierError, CourierResult, SessionError, SessionResult};
pub use event::{BotEvent, ChannelKind, EventCategory, EventKind, Identity};
pub use hub::{DeliveryReport, EventHub, HubConfig, HubEvent};
pub use manager::{SessionConfig, SessionManager};
pub use session::{Session, SessionKey, SessionRef, SessionState};
pub use state::StateCode;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Bot, BotEvent, BotRegistry, CourierContext, CourierError, CourierResult, EventKind,
        Identity, Session, SessionKey, SessionManager, StateCode, TransportAdapter,
    };
}
