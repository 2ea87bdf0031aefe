//! Webhook push transport.
//!
//! Events are queued and POSTed by a background worker to every configured
//! destination, with identity-correlation headers. Delivery is at-most-once:
//! a failed POST is logged and dropped, never retried. A response body that
//! carries an action envelope is executed against the originating bot.
//!
//! ```text
//! hub ──on_receive_event──▶ bounded queue ──worker──▶ POST dest₁, dest₂, ...
//!                                                       │
//!                                   action envelope ◀───┘ (optional reply)
//! ```

mod headers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, ClientBuilder, header};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use courier_core::{
    ActionEnvelope, CourierContext, CourierError, CourierResult, DeliveryOutcome, HubEvent,
    Identity, Outgoing, Session, SessionRef, TransportAdapter,
};

pub use headers::{IDENTITY_HEADERS, identity_headers, static_headers};

/// Webhook adapter configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoints every event is POSTed to.
    pub destinations: Vec<String>,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Events queued for the worker before deliveries fail.
    pub queue_capacity: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            headers: HashMap::new(),
            timeout: Duration::from_millis(5000),
            queue_capacity: 1024,
        }
    }
}

/// One queued POST.
struct WebhookJob {
    sequence: u64,
    origin: Identity,
    frame: String,
}

/// Push adapter POSTing events to HTTP endpoints.
pub struct WebhookAdapter {
    config: WebhookConfig,
    client: Client,
    ctx: CourierContext,
    enabled: AtomicBool,
    /// Highest event sequence already queued; an event reaching several
    /// sessions is posted once.
    last_queued: AtomicU64,
    queue: mpsc::Sender<WebhookJob>,
    pending: Mutex<Option<mpsc::Receiver<WebhookJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Sessions kept bound to each bot identity seen so far.
    held: Mutex<HashMap<Identity, SessionRef>>,
    shutdown: CancellationToken,
}

impl WebhookAdapter {
    /// Creates the adapter; the worker starts in [`TransportAdapter::init_adapter`].
    pub fn new(config: WebhookConfig, ctx: CourierContext) -> CourierResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .default_headers(static_headers(&config.headers)?)
            .build()
            .map_err(|e| CourierError::transport(e.to_string()))?;
        let (queue, pending) = mpsc::channel(config.queue_capacity.max(1));

        Ok(Self {
            config,
            client,
            ctx,
            enabled: AtomicBool::new(true),
            last_queued: AtomicU64::new(0),
            queue,
            pending: Mutex::new(Some(pending)),
            worker: Mutex::new(None),
            held: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Keeps a session bound to `identity` alive so its events reach the
    /// webhook without any client connected. A no-op if one is already held.
    pub fn hold_session(&self, identity: Identity) -> CourierResult<()> {
        let mut held = self.held.lock();
        if held.get(&identity).is_some_and(|s| !s.session().is_closed()) {
            return Ok(());
        }
        let session = self.ctx.sessions.create_session()?;
        if let Err(e) = self.ctx.sessions.authenticate(session.key(), identity) {
            self.ctx.sessions.close_session(session.key());
            return Err(e);
        }
        debug!(session = %session.key(), identity = %identity, "Holding webhook session");
        held.insert(identity, session.acquire());
        Ok(())
    }

    /// Identities with a held session.
    pub fn held_identities(&self) -> Vec<Identity> {
        let mut ids: Vec<_> = self.held.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl TransportAdapter for WebhookAdapter {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn init_adapter(&self) -> CourierResult<()> {
        let Some(pending) = self.pending.lock().take() else {
            return Ok(());
        };

        if !self.ctx.single_mode() {
            for identity in self.ctx.sessions.bots().identities() {
                self.hold_session(identity)?;
            }
        }

        let worker = Worker {
            client: self.client.clone(),
            destinations: self.config.destinations.clone(),
            ctx: self.ctx.clone(),
        };
        let handle = tokio::spawn(worker.run(pending, self.shutdown.clone()));
        *self.worker.lock() = Some(handle);

        info!(
            destinations = self.config.destinations.len(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Webhook adapter initialized"
        );
        Ok(())
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

    /// Bots registered after startup get their session on their first event.
    fn observe_origin(&self, origin: Identity) {
        if self.ctx.single_mode()
            || self.config.destinations.is_empty()
            || self.shutdown.is_cancelled()
            || self.ctx.sessions.bots().get(origin).is_none()
        {
            return;
        }
        if let Err(e) = self.hold_session(origin) {
            warn!(identity = %origin, error = %e, "Failed to hold webhook session");
        }
    }

    async fn on_receive_event(
        &self,
        event: &HubEvent,
        _session: &Arc<Session>,
    ) -> CourierResult<DeliveryOutcome> {
        if self.config.destinations.is_empty() {
            return Ok(DeliveryOutcome::Skipped);
        }
        if self.last_queued.fetch_max(event.sequence, Ordering::AcqRel) >= event.sequence {
            return Ok(DeliveryOutcome::Skipped);
        }

        let frame = self
            .ctx
            .codec
            .encode_envelope(&Outgoing::event(event.payload.clone()))?;
        let job = WebhookJob {
            sequence: event.sequence,
            origin: event.origin,
            frame,
        };

        self.queue.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CourierError::transport("webhook queue full"),
            mpsc::error::TrySendError::Closed(_) => CourierError::transport("webhook worker stopped"),
        })?;
        Ok(DeliveryOutcome::Delivered)
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        self.held.lock().clear();
        debug!("Webhook adapter stopped");
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────────

struct Worker {
    client: Client,
    destinations: Vec<String>,
    ctx: CourierContext,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::Receiver<WebhookJob>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => self.deliver(job).await,
                    None => break,
                },
            }
        }
        debug!("Webhook worker exited");
    }

    async fn deliver(&self, job: WebhookJob) {
        for destination in &self.destinations {
            match self.post(destination, &job).await {
                Ok(reply) => {
                    trace!(destination = %destination, sequence = job.sequence, "Webhook delivered");
                    if let Some(reply) = reply {
                        self.execute_reply(&job, reply).await;
                    }
                }
                Err(e) => {
                    warn!(
                        destination = %destination,
                        sequence = job.sequence,
                        identity = %job.origin,
                        error = %e,
                        "Webhook delivery failed"
                    );
                }
            }
        }
    }

    async fn post(&self, destination: &str, job: &WebhookJob) -> CourierResult<Option<Value>> {
        let response = self
            .client
            .post(destination)
            .headers(identity_headers(job.origin))
            .header(header::CONTENT_TYPE, "application/json")
            .body(job.frame.clone())
            .send()
            .await
            .map_err(|e| CourierError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::transport(format!("HTTP {} error", status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CourierError::transport(e.to_string()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&body).ok())
    }

    /// Runs an action envelope returned by a webhook endpoint on the bot that
    /// produced the event.
    async fn execute_reply(&self, job: &WebhookJob, reply: Value) {
        let Ok(envelope) = serde_json::from_value::<ActionEnvelope>(reply) else {
            return;
        };
        let out = self.ctx.actions.handle_for_identity(job.origin, envelope).await;
        debug!(identity = %job.origin, result = %out.data, "Executed webhook reply");
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use courier_core::{
        AuthGate, Bot, BotEvent, Codec, EventHub, EventKind, HubConfig, JsonCodec, SessionConfig,
        SessionManager, StaticBotRegistry,
    };

    use super::*;

    type Received = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    async fn spawn_endpoint() -> (SocketAddr, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let app = Router::new()
            .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/reply",
                post(|| async {
                    axum::Json(serde_json::json!({
                        "syncId": "5",
                        "command": "sendFriendMessage",
                        "content": { "target": 9 },
                    }))
                }),
            )
            .route(
                "/ok",
                post(move |headers: HeaderMap, body: Bytes| {
                    let sink = sink.clone();
                    async move {
                        let value: Value = serde_json::from_slice(&body).unwrap();
                        sink.lock().push((headers, value));
                        StatusCode::OK
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (addr, received)
    }

    type Calls = Arc<Mutex<Vec<(Identity, String)>>>;

    /// Records every command it executes.
    struct RecordingBot {
        identity: Identity,
        calls: Calls,
    }

    #[async_trait]
    impl Bot for RecordingBot {
        fn identity(&self) -> Identity {
            self.identity
        }

        async fn execute(
            &self,
            command: &str,
            _sub_command: Option<&str>,
            _content: Value,
        ) -> CourierResult<Value> {
            self.calls.lock().push((self.identity, command.to_string()));
            Ok(serde_json::json!({ "code": 0 }))
        }
    }

    fn register(registry: &StaticBotRegistry, calls: &Calls, id: i64) {
        registry.register(Arc::new(RecordingBot {
            identity: Identity(id),
            calls: calls.clone(),
        }));
    }

    fn ctx_with(registry: Arc<StaticBotRegistry>) -> CourierContext {
        let sessions = Arc::new(SessionManager::new(SessionConfig::default(), registry));
        CourierContext::new(sessions, AuthGate::disabled(), Arc::new(JsonCodec), false)
    }

    fn ctx() -> CourierContext {
        ctx_with(Arc::new(StaticBotRegistry::new()))
    }

    fn hub(ctx: &CourierContext, adapter: Arc<WebhookAdapter>, broadcast: bool) -> EventHub {
        EventHub::new(
            ctx.sessions.clone(),
            vec![adapter],
            ctx.codec.clone(),
            HubConfig {
                broadcast,
                ..Default::default()
            },
        )
    }

    fn hub_event(sequence: u64, origin: i64) -> HubEvent {
        let kind = EventKind::friend_text(9, format!("event {sequence}"));
        HubEvent {
            sequence,
            payload: JsonCodec.encode_event(&kind).unwrap(),
            event: BotEvent::new(origin, kind),
        }
    }

    async fn wait_for(received: &Received, n: usize) {
        for _ in 0..100 {
            if received.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {n} webhook requests");
    }

    #[tokio::test]
    async fn test_failing_destination_does_not_block_others() {
        let (addr, received) = spawn_endpoint().await;
        let ctx = ctx();
        let session = ctx.sessions.create_session().unwrap();
        let adapter = WebhookAdapter::new(
            WebhookConfig {
                destinations: vec![format!("http://{addr}/fail"), format!("http://{addr}/ok")],
                headers: [("X-Token".to_string(), "t0k".to_string())].into(),
                ..Default::default()
            },
            ctx,
        )
        .unwrap();
        adapter.init_adapter().await.unwrap();

        for seq in 1..=2 {
            let outcome = adapter.on_receive_event(&hub_event(seq, 42), &session).await.unwrap();
            assert_eq!(outcome, DeliveryOutcome::Delivered);
        }
        wait_for(&received, 2).await;

        let received = received.lock();
        let (headers, first) = &received[0];
        assert_eq!(headers.get("qq").unwrap(), "42");
        assert_eq!(headers.get("x-bot").unwrap(), "42");
        assert_eq!(headers.get("x-token").unwrap(), "t0k");
        assert_eq!(first["syncId"], "-1");
        assert_eq!(first["data"]["messageChain"][0]["text"], "event 1");
        assert_eq!(received[1].1["data"]["messageChain"][0]["text"], "event 2");
        drop(received);

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_event_posted_once_across_sessions() {
        let ctx = ctx();
        let a = ctx.sessions.create_session().unwrap();
        let b = ctx.sessions.create_session().unwrap();
        let adapter = WebhookAdapter::new(
            WebhookConfig {
                destinations: vec!["http://127.0.0.1:9/unused".into()],
                ..Default::default()
            },
            ctx,
        )
        .unwrap();

        let event = hub_event(1, 1);
        assert_eq!(
            adapter.on_receive_event(&event, &a).await.unwrap(),
            DeliveryOutcome::Delivered
        );
        assert_eq!(
            adapter.on_receive_event(&event, &b).await.unwrap(),
            DeliveryOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_full_queue_fails_delivery() {
        let ctx = ctx();
        let session = ctx.sessions.create_session().unwrap();
        let adapter = WebhookAdapter::new(
            WebhookConfig {
                destinations: vec!["http://127.0.0.1:9/unused".into()],
                queue_capacity: 1,
                ..Default::default()
            },
            ctx,
        )
        .unwrap();

        // Worker not started: the queue fills up.
        adapter.on_receive_event(&hub_event(1, 1), &session).await.unwrap();
        assert!(adapter.on_receive_event(&hub_event(2, 1), &session).await.is_err());
    }

    #[tokio::test]
    async fn test_reply_runs_on_origin_bot() {
        let (addr, _) = spawn_endpoint().await;
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(StaticBotRegistry::new());
        register(&registry, &calls, 1);
        register(&registry, &calls, 2);
        let ctx = ctx_with(registry);

        // A client bound to another bot also receives the event when broadcasting.
        let client = ctx.sessions.create_session().unwrap();
        ctx.sessions.authenticate(client.key(), Identity(2)).unwrap();

        let adapter = Arc::new(
            WebhookAdapter::new(
                WebhookConfig {
                    destinations: vec![format!("http://{addr}/reply")],
                    ..Default::default()
                },
                ctx.clone(),
            )
            .unwrap(),
        );
        adapter.init_adapter().await.unwrap();
        let hub = hub(&ctx, adapter.clone(), true);

        for i in 0..5 {
            hub.dispatch(BotEvent::new(1, EventKind::friend_text(9, format!("{i}"))))
                .await;
        }
        for _ in 0..100 {
            if calls.lock().len() >= 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let calls = calls.lock().clone();
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().all(|(bot, command)| *bot == Identity(1) && command == "sendFriendMessage"));
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_bot_registered_after_init_is_posted() {
        let (addr, received) = spawn_endpoint().await;
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(StaticBotRegistry::new());
        let ctx = ctx_with(registry.clone());

        let adapter = Arc::new(
            WebhookAdapter::new(
                WebhookConfig {
                    destinations: vec![format!("http://{addr}/ok")],
                    ..Default::default()
                },
                ctx.clone(),
            )
            .unwrap(),
        );
        adapter.init_adapter().await.unwrap();
        assert!(adapter.held_identities().is_empty());

        register(&registry, &calls, 7);
        let hub = hub(&ctx, adapter.clone(), false);
        let reports = hub.dispatch(BotEvent::new(7, EventKind::friend_text(9, "late"))).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, DeliveryOutcome::Delivered);

        wait_for(&received, 1).await;
        {
            let received = received.lock();
            assert_eq!(received[0].0.get("qq").unwrap(), "7");
            assert_eq!(received[0].1["data"]["messageChain"][0]["text"], "late");
        }
        assert_eq!(adapter.held_identities(), vec![Identity(7)]);

        // Unknown bots get no session.
        hub.dispatch(BotEvent::new(8, EventKind::friend_text(9, "ghost"))).await;
        assert_eq!(adapter.held_identities(), vec![Identity(7)]);
        adapter.shutdown().await;
    }
}
