//! Event hub: fans one domain event out to every interested session.
//!
//! ```text
//! event source ──mpsc──▶ EventHub::run
//!                           │ one event at a time
//!                           ▼
//!              ┌── session A ──┬── http    ─▶ cache
//!              │               ├── ws      ─▶ connection queue
//!              │               └── webhook ─▶ POST queue
//!              └── session B ── ...
//! ```
//!
//! A pass over all (session, adapter) pairs completes before the next event
//! is taken, which keeps per-session per-channel order equal to arrival order.
//! Within a pass every delivery runs concurrently and is isolated: a slow,
//! failing or panicking delivery is bounded by a timeout, logged, and never
//! affects the others.

use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::adapter::{BoxedAdapter, DeliveryOutcome};
use crate::codec::BoxedCodec;
use crate::event::BotEvent;
use crate::manager::SessionManager;
use crate::session::{Session, SessionKey};

// =============================================================================
// Hub Event
// =============================================================================

/// An event in flight, with its arrival sequence and encoded payload.
#[derive(Debug, Clone)]
pub struct HubEvent {
    /// Monotonic arrival number, starting at 1.
    pub sequence: u64,
    pub event: BotEvent,
    /// Codec output for `event.kind`, shared by every adapter.
    pub payload: Value,
}

impl Deref for HubEvent {
    type Target = BotEvent;

    fn deref(&self) -> &BotEvent {
        &self.event
    }
}

/// Outcome of one delivery within a pass.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub session: SessionKey,
    pub adapter: &'static str,
    pub outcome: DeliveryOutcome,
}

/// Hub policy.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound for one delivery call.
    pub delivery_timeout: Duration,
    /// Deliver every event to every session regardless of bound identity.
    pub broadcast: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_millis(3000),
            broadcast: false,
        }
    }
}

// =============================================================================
// Event Hub
// =============================================================================

pub struct EventHub {
    sessions: Arc<SessionManager>,
    adapters: Vec<BoxedAdapter>,
    codec: BoxedCodec,
    config: HubConfig,
    next_seq: AtomicU64,
}

impl EventHub {
    pub fn new(
        sessions: Arc<SessionManager>,
        adapters: Vec<BoxedAdapter>,
        codec: BoxedCodec,
        config: HubConfig,
    ) -> Self {
        Self {
            sessions,
            adapters,
            codec,
            config,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn adapters(&self) -> &[BoxedAdapter] {
        &self.adapters
    }

    /// Returns `true` if `session` should receive `event`.
    pub fn is_interested(&self, session: &Session, event: &BotEvent) -> bool {
        if session.is_closed() {
            return false;
        }
        self.config.broadcast || session.identity() == Some(event.origin)
    }

    /// Runs one full delivery pass for `event`.
    pub async fn dispatch(&self, event: BotEvent) -> Vec<DeliveryReport> {
        let payload = match self.codec.encode_event(&event.kind) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, kind = event.kind.type_name(), "Failed to encode event, dropping");
                return Vec::new();
            }
        };

        let event = HubEvent {
            sequence: self.next_seq.fetch_add(1, Ordering::Relaxed),
            event,
            payload,
        };

        let adapters: Vec<&BoxedAdapter> = self.adapters.iter().filter(|a| a.is_enabled()).collect();
        for adapter in &adapters {
            adapter.observe_origin(event.origin);
        }

        let sessions: Vec<Arc<Session>> = self
            .sessions
            .sessions()
            .into_iter()
            .filter(|s| self.is_interested(s, &event))
            .collect();

        trace!(
            sequence = event.sequence,
            identity = %event.origin,
            kind = event.kind.type_name(),
            sessions = sessions.len(),
            adapters = adapters.len(),
            "Dispatching event"
        );

        let event = &event;
        let deliveries = sessions.iter().flat_map(|session| {
            adapters
                .iter()
                .map(move |adapter| self.deliver(adapter, event, session))
        });

        join_all(deliveries).await
    }

    async fn deliver(
        &self,
        adapter: &BoxedAdapter,
        event: &HubEvent,
        session: &Arc<Session>,
    ) -> DeliveryReport {
        let call = AssertUnwindSafe(adapter.on_receive_event(event, session)).catch_unwind();
        let outcome = match tokio::time::timeout(self.config.delivery_timeout, call).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => DeliveryOutcome::Failed(e.to_string()),
            Ok(Err(_)) => DeliveryOutcome::Failed("adapter panicked".into()),
            Err(_) => DeliveryOutcome::Failed(format!(
                "timed out after {:?}",
                self.config.delivery_timeout
            )),
        };

        if let DeliveryOutcome::Failed(reason) = &outcome {
            warn!(
                session = %session.key(),
                adapter = adapter.name(),
                sequence = event.sequence,
                reason = %reason,
                "Event delivery failed"
            );
        }

        DeliveryReport {
            session: session.key().clone(),
            adapter: adapter.name(),
            outcome,
        }
    }

    /// Consumes events from the source until it closes or `shutdown` fires.
    pub async fn run(&self, mut events: mpsc::Receiver<BotEvent>, shutdown: CancellationToken) {
        info!(adapters = self.adapters.len(), "Event hub started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Event hub shutdown signal received");
                    break;
                }
                next = events.recv() => match next {
                    Some(event) => {
                        self.dispatch(event).await;
                    }
                    None => {
                        debug!("Event source closed");
                        break;
                    }
                },
            }
        }
        info!("Event hub stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::adapter::TransportAdapter;
    use crate::bot::tests::registry_with;
    use crate::codec::JsonCodec;
    use crate::error::{CourierError, CourierResult};
    use crate::event::{EventKind, Identity};
    use crate::manager::SessionConfig;

    /// Records every delivered sequence per session.
    struct Recorder {
        enabled: AtomicBool,
        seen: Mutex<Vec<(SessionKey, u64)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                enabled: AtomicBool::new(true),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TransportAdapter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
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
            self.seen.lock().push((session.key().clone(), event.sequence));
            Ok(DeliveryOutcome::Delivered)
        }
    }

    /// Fails, hangs, or panics depending on the event origin.
    struct Faulty;

    #[async_trait]
    impl TransportAdapter for Faulty {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn enable(&self) {}

        fn disable(&self) {}

        fn is_enabled(&self) -> bool {
            true
        }

        async fn on_receive_event(
            &self,
            event: &HubEvent,
            _session: &Arc<Session>,
        ) -> CourierResult<DeliveryOutcome> {
            match event.origin.0 {
                1 => Err(CourierError::transport("boom")),
                2 => std::future::pending().await,
                _ => panic!("adapter bug"),
            }
        }
    }

    /// Binds a session to every origin it observes, like the webhook adapter.
    struct Binder {
        sessions: Arc<SessionManager>,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl TransportAdapter for Binder {
        fn name(&self) -> &'static str {
            "binder"
        }

        fn enable(&self) {}

        fn disable(&self) {}

        fn is_enabled(&self) -> bool {
            true
        }

        fn observe_origin(&self, origin: Identity) {
            let bound = self
                .sessions
                .sessions()
                .iter()
                .any(|s| s.identity() == Some(origin));
            if !bound {
                let s = self.sessions.create_session().unwrap();
                self.sessions.authenticate(s.key(), origin).unwrap();
            }
        }

        async fn on_receive_event(
            &self,
            event: &HubEvent,
            session: &Arc<Session>,
        ) -> CourierResult<DeliveryOutcome> {
            self.recorder.on_receive_event(event, session).await
        }
    }

    fn setup(adapters: Vec<BoxedAdapter>, broadcast: bool) -> (Arc<SessionManager>, EventHub) {
        let sessions = Arc::new(SessionManager::new(
            SessionConfig::default(),
            registry_with(&[1, 2, 3]),
        ));
        let hub = EventHub::new(
            sessions.clone(),
            adapters,
            Arc::new(JsonCodec),
            HubConfig {
                delivery_timeout: Duration::from_millis(100),
                broadcast,
            },
        );
        (sessions, hub)
    }

    fn bound(sessions: &SessionManager, id: i64) -> Arc<Session> {
        let s = sessions.create_session().unwrap();
        sessions.authenticate(s.key(), Identity(id)).unwrap();
        s
    }

    #[tokio::test]
    async fn test_delivers_only_to_matching_identity() {
        let recorder = Recorder::new();
        let (sessions, hub) = setup(vec![recorder.clone()], false);
        let q1 = bound(&sessions, 1);
        let _q2 = bound(&sessions, 2);
        let _unbound = sessions.create_session().unwrap();

        let reports = hub.dispatch(BotEvent::new(1, EventKind::friend_text(5, "hi"))).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(&reports[0].session, q1.key());
        assert_eq!(recorder.seen.lock().as_slice(), &[(q1.key().clone(), 1)]);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let recorder = Recorder::new();
        let (sessions, hub) = setup(vec![recorder.clone()], true);
        bound(&sessions, 1);
        bound(&sessions, 2);
        sessions.create_session().unwrap();

        let reports = hub.dispatch(BotEvent::new(3, EventKind::friend_text(5, "hi"))).await;
        assert_eq!(reports.len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_adapter_skipped() {
        let recorder = Recorder::new();
        let (sessions, hub) = setup(vec![recorder.clone()], false);
        bound(&sessions, 1);

        recorder.disable();
        assert!(hub.dispatch(BotEvent::new(1, EventKind::friend_text(5, "a"))).await.is_empty());
        recorder.enable();
        assert_eq!(hub.dispatch(BotEvent::new(1, EventKind::friend_text(5, "b"))).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let recorder = Recorder::new();
        let (sessions, hub) = setup(vec![Arc::new(Faulty), recorder.clone()], false);
        bound(&sessions, 1);
        bound(&sessions, 2);
        bound(&sessions, 3);

        for origin in [1, 2, 3] {
            let reports = hub
                .dispatch(BotEvent::new(origin, EventKind::friend_text(5, "x")))
                .await;
            let faulty = reports.iter().find(|r| r.adapter == "faulty").unwrap();
            assert!(matches!(faulty.outcome, DeliveryOutcome::Failed(_)));
            let ok = reports.iter().find(|r| r.adapter == "recorder").unwrap();
            assert_eq!(ok.outcome, DeliveryOutcome::Delivered);
        }
        assert_eq!(recorder.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_run_preserves_arrival_order() {
        let recorder = Recorder::new();
        let (sessions, hub) = setup(vec![recorder.clone()], false);
        bound(&sessions, 1);

        let (tx, rx) = mpsc::channel(16);
        for i in 0..5 {
            tx.send(BotEvent::new(1, EventKind::friend_text(5, format!("{i}"))))
                .await
                .unwrap();
        }
        drop(tx);
        hub.run(rx, CancellationToken::new()).await;

        let seqs: Vec<u64> = recorder.seen.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_observed_origin_bound_in_same_pass() {
        let recorder = Recorder::new();
        let sessions = Arc::new(SessionManager::new(
            SessionConfig::default(),
            registry_with(&[1, 2]),
        ));
        let binder = Arc::new(Binder {
            sessions: sessions.clone(),
            recorder: recorder.clone(),
        });
        let hub = EventHub::new(sessions.clone(), vec![binder], Arc::new(JsonCodec), HubConfig::default());

        let reports = hub.dispatch(BotEvent::new(2, EventKind::friend_text(5, "x"))).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, DeliveryOutcome::Delivered);

        hub.dispatch(BotEvent::new(2, EventKind::friend_text(5, "y"))).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(recorder.seen.lock().len(), 2);
    }
}
