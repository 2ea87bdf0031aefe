//! WebSocket push transport.
//!
//! Clients open one connection per channel (`/message`, `/event`, `/all`).
//! Events are written to the live connection of each matching channel and
//! dropped when there is none; nothing is buffered for absent clients.

mod channel;
mod handshake;
pub mod routes;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use courier_core::{
    BoxedCodec, ChannelKind, CourierResult, DeliveryOutcome, HubEvent, Outgoing, Session,
    TransportAdapter,
};

/// WebSocket adapter configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Outbound frames queued per connection before deliveries fail.
    pub send_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { send_buffer: 256 }
    }
}

/// Push adapter writing to per-channel session connections.
pub struct WsAdapter {
    config: WsConfig,
    codec: BoxedCodec,
    enabled: AtomicBool,
}

impl WsAdapter {
    pub fn new(config: WsConfig, codec: BoxedCodec) -> Self {
        Self {
            config,
            codec,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }
}

#[async_trait]
impl TransportAdapter for WsAdapter {
    fn name(&self) -> &'static str {
        "ws"
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    async fn on_receive_event(
        &self,
        event: &HubEvent,
        session: &Arc<Session>,
    ) -> CourierResult<DeliveryOutcome> {
        let category = event.category();
        let targets: Vec<_> = ChannelKind::ALL
            .into_iter()
            .filter(|kind| kind.accepts(category))
            .filter_map(|kind| session.channel(kind))
            .collect();

        if targets.is_empty() {
            return Ok(DeliveryOutcome::Skipped);
        }

        let frame = self
            .codec
            .encode_envelope(&Outgoing::event(event.payload.clone()))?;

        // Every target gets its attempt even if an earlier one failed.
        let mut failure = None;
        for handle in &targets {
            if let Err(e) = handle.try_send(frame.clone()) {
                failure = Some(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(DeliveryOutcome::Delivered),
        }
    }
}
