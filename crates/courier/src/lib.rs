//! # Courier
//!
//! A bot gateway: it exposes each bot's events and actions to external
//! client programs over several wire transports at once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  events   ┌──────────┐   per session × adapter   ┌────────────────────┐
//! │   bots   │──────────▶│ EventHub │──────────────────────────▶│ HTTP poll cache    │──▶ clients
//! │          │           └──────────┘                           │ WebSocket channels │
//! │          │◀──────────── ActionRouter ◀────── actions ───────│ webhook POSTs      │
//! └──────────┘                                                  └────────────────────┘
//! ```
//!
//! - **Sessions**: a client verifies with the shared secret, then binds its
//!   session to one bot identity
//! - **Adapters**: each transport receives every event for every interested
//!   session; one failing transport never blocks the others
//! - **Runtime**: configuration, logging, the server and background tasks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::new();
//!     runtime.register_bot(Arc::new(MyBot::new(12345)));
//!
//!     let events = runtime.event_sender();
//!     tokio::spawn(async move {
//!         events.send(BotEvent::new(12345, EventKind::friend_text(1, "hi"))).await
//!     });
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines
//! - `http`, `ws`, `webhook`: individual transports; `full-transport` (default) enables all

pub use courier_core as core;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, CourierRuntime, RuntimeHandle};

    // Bot seam
    pub use courier_core::{Bot, BotRegistry, BoxedBot, StaticBotRegistry};

    // Events and sessions
    pub use courier_core::{BotEvent, ChannelKind, EventKind, Identity, Session, SessionKey};

    // Errors and wire status
    pub use courier_core::{CourierError, CourierResult, StateCode};
}
