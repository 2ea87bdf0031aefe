//! Transport adapter contract.
//!
//! Every wire transport (HTTP poll, WebSocket push, webhook push) implements
//! [`TransportAdapter`]. The [`EventHub`](crate::hub::EventHub) calls
//! [`on_receive_event`](TransportAdapter::on_receive_event) once per
//! (session, adapter, event); each adapter maps that onto its own consumption
//! model and backpressure policy.
//!
//! # Example
//!
//! ```rust,ignore
//! #[async_trait]
//! impl TransportAdapter for LogAdapter {
//!     fn name(&self) -> &'static str { "log" }
//!
//!     async fn on_receive_event(
//!         &self,
//!         event: &HubEvent,
//!         session: &Arc<Session>,
//!     ) -> CourierResult<DeliveryOutcome> {
//!         info!(session = %session.key(), kind = event.kind.type_name(), "event");
//!         Ok(DeliveryOutcome::Delivered)
//!     }
//!     // ...
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CourierResult;
use crate::event::Identity;
use crate::hub::HubEvent;
use crate::session::Session;

/// Result of one (session, adapter, event) delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to the transport.
    Delivered,
    /// Nothing to deliver to (no active connection, or not subscribed).
    Skipped,
    /// The transport failed; the cause is logged.
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => f.write_str("delivered"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A transport-specific strategy for delivering events to clients.
///
/// Lifecycle: [`init_adapter`](Self::init_adapter) once before the server
/// starts, then any number of [`enable`](Self::enable)/[`disable`](Self::disable)
/// toggles. A disabled adapter is skipped by the hub.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Adapter name as used in configuration (`http`, `ws`, `webhook`).
    fn name(&self) -> &'static str;

    /// Prepares background resources. Called once.
    async fn init_adapter(&self) -> CourierResult<()> {
        Ok(())
    }

    fn enable(&self);

    fn disable(&self);

    fn is_enabled(&self) -> bool;

    /// Called once per event, before the hub selects interested sessions.
    ///
    /// Adapters that keep their own sessions bound to bot identities create
    /// them here for identities they have not seen yet.
    fn observe_origin(&self, _origin: Identity) {}

    /// Delivers one event to one session.
    ///
    /// Errors are turned into [`DeliveryOutcome::Failed`] by the hub and never
    /// reach other deliveries.
    async fn on_receive_event(
        &self,
        event: &HubEvent,
        session: &Arc<Session>,
    ) -> CourierResult<DeliveryOutcome>;

    /// Releases background resources on shutdown.
    async fn shutdown(&self) {}
}

/// A boxed adapter trait object.
pub type BoxedAdapter = Arc<dyn TransportAdapter>;
