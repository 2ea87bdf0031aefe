//! Runtime orchestration: builds the session engine and transports from
//! configuration and owns their background tasks.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .config_file("config/courier.toml")
//!     .build()?;
//! runtime.register_bot(Arc::new(MyBot::new(12345)));
//!
//! let events = runtime.event_sender();
//! // feed `events` from the bot backend...
//!
//! runtime.run().await?;
//! ```
//!
//! # Tasks
//!
//! ```text
//! event_sender ──▶ hub loop ──▶ adapters ──▶ clients
//!                  sweeper (every session.sweep_interval_secs)
//!                  server  (HTTP + WebSocket routes)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_core::{
    AuthGate, BotEvent, BoxedAdapter, BoxedBot, CourierContext, EventHub, HubConfig, JsonCodec,
    SessionConfig, SessionManager, StaticBotRegistry,
};
use courier_transport::TransportSet;
use courier_transport::server::{self, ServerHandle};

use crate::config::{ConfigLoader, ConfigResult, CourierConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Events buffered between the bot backend and the hub loop.
const EVENT_QUEUE: usize = 1024;

/// The Courier runtime.
pub struct CourierRuntime {
    config: CourierConfig,
    bots: Arc<StaticBotRegistry>,
    events_tx: mpsc::Sender<BotEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<BotEvent>>>,
}

impl CourierRuntime {
    /// Creates a runtime from the default configuration locations, falling
    /// back to built-in defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                CourierConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from `config` and initializes logging from it.
    pub fn from_config(config: &CourierConfig) -> Self {
        logging::init_from_config(&config.logging);

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        info!(
            log_level = %config.logging.level,
            adapters = ?config.adapters,
            single_mode = config.single_mode,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            bots: Arc::new(StaticBotRegistry::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// The bot registry sessions are bound against.
    pub fn bots(&self) -> &Arc<StaticBotRegistry> {
        &self.bots
    }

    pub fn register_bot(&self, bot: BoxedBot) {
        info!(identity = %bot.identity(), "Registered bot");
        self.bots.register(bot);
    }

    /// Sender the bot backend pushes events into.
    pub fn event_sender(&self) -> mpsc::Sender<BotEvent> {
        self.events_tx.clone()
    }

    /// Starts every task and returns a handle to stop them.
    pub async fn start(&self) -> RuntimeResult<RuntimeHandle> {
        validate_config(&self.config)?;
        let events = self
            .events_rx
            .lock()
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;

        let config = &self.config;
        let sessions = Arc::new(SessionManager::new(
            SessionConfig {
                max_sessions: config.session.max_sessions,
                idle_timeout: config.session.idle_timeout(),
                single_mode: config.single_mode,
            },
            self.bots.clone(),
        ));
        let auth = if config.single_mode {
            AuthGate::disabled()
        } else {
            AuthGate::new(config.verify_key.clone(), config.enable_verify)
        };
        let ctx = CourierContext::new(sessions.clone(), auth, Arc::new(JsonCodec), config.debug);

        let transports = build_transports(config, &ctx)?;
        let adapters = transports.adapters();
        for adapter in &adapters {
            adapter.init_adapter().await?;
            debug!(adapter = adapter.name(), "Adapter initialized");
        }

        if config.single_mode {
            let session = sessions.create_single_session(true);
            info!(identity = ?session.identity(), "Single session ready");
        }

        let shutdown = CancellationToken::new();
        let hub = Arc::new(EventHub::new(
            sessions.clone(),
            adapters.clone(),
            ctx.codec.clone(),
            HubConfig {
                delivery_timeout: Duration::from_millis(config.hub.delivery_timeout_ms),
                broadcast: config.hub.broadcast,
            },
        ));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn({
            let hub = hub.clone();
            let token = shutdown.child_token();
            async move { hub.run(events, token).await }
        }));
        tasks.push(spawn_sweeper(
            sessions,
            config.session.idle_timeout(),
            config.session.sweep_interval(),
            shutdown.child_token(),
        ));

        let server = if serves_routes(&transports) {
            let addr = config.server.addr();
            let router = transports.router(&ctx);
            let handle = server::bind(&addr, router, shutdown.child_token())
                .await
                .map_err(|source| RuntimeError::Bind { addr, source })?;
            Some(handle)
        } else {
            None
        };

        info!(
            adapters = adapters.len(),
            addr = ?server.as_ref().map(ServerHandle::local_addr),
            "Courier runtime started"
        );

        Ok(RuntimeHandle {
            ctx,
            hub,
            adapters,
            server,
            tasks,
            shutdown,
        })
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start().await?;
        info!("Courier runtime is now running");
        shutdown.await;
        handle.shutdown().await;
        Ok(())
    }
}

impl Default for CourierRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the configured adapters. Fails if one is not compiled in.
#[allow(unused_variables)]
fn build_transports(config: &CourierConfig, ctx: &CourierContext) -> RuntimeResult<TransportSet> {
    #[allow(unused_mut)]
    let mut transports = TransportSet {
        cors: config.server.cors.clone(),
        ..Default::default()
    };

    for name in &config.adapters {
        match name.as_str() {
            #[cfg(feature = "http")]
            "http" => {
                use courier_transport::{HttpAdapter, HttpConfig};
                transports.http = Some(Arc::new(HttpAdapter::new(HttpConfig {
                    cache_capacity: config.http.cache_capacity,
                })));
            }
            #[cfg(feature = "ws")]
            "ws" => {
                use courier_transport::{WsAdapter, WsConfig};
                transports.ws = Some(Arc::new(WsAdapter::new(
                    WsConfig {
                        send_buffer: config.ws.send_buffer,
                    },
                    ctx.codec.clone(),
                )));
            }
            #[cfg(feature = "webhook")]
            "webhook" => {
                use courier_transport::{WebhookAdapter, WebhookConfig};
                let webhook = WebhookAdapter::new(
                    WebhookConfig {
                        destinations: config.webhook.destinations.clone(),
                        headers: config.webhook.headers.clone(),
                        timeout: Duration::from_millis(config.webhook.timeout_ms),
                        queue_capacity: config.webhook.queue_capacity,
                    },
                    ctx.clone(),
                )?;
                transports.webhook = Some(Arc::new(webhook));
            }
            other => return Err(RuntimeError::AdapterUnavailable(other.to_string())),
        }
    }

    Ok(transports)
}

/// Whether any adapter needs the HTTP listener.
#[allow(unused_variables)]
fn serves_routes(transports: &TransportSet) -> bool {
    #[allow(unused_mut)]
    let mut serves = false;
    #[cfg(feature = "http")]
    {
        serves |= transports.http.is_some();
    }
    #[cfg(feature = "ws")]
    {
        serves |= transports.ws.is_some();
    }
    serves
}

fn spawn_sweeper(
    sessions: Arc<SessionManager>,
    idle_timeout: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let expired = sessions.sweep_expired(idle_timeout);
                    if !expired.is_empty() {
                        info!(count = expired.len(), "Closed idle sessions");
                    }
                }
            }
        }
        debug!("Session sweeper stopped");
    })
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

// =============================================================================
// RuntimeHandle
// =============================================================================

/// A started runtime.
pub struct RuntimeHandle {
    ctx: CourierContext,
    hub: Arc<EventHub>,
    adapters: Vec<BoxedAdapter>,
    server: Option<ServerHandle>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl RuntimeHandle {
    pub fn context(&self) -> &CourierContext {
        &self.ctx
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// The bound server address, if any adapter serves routes.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    /// Stops the server and tasks, shuts adapters down and closes every session.
    pub async fn shutdown(self) {
        info!("Stopping Courier runtime");
        self.shutdown.cancel();

        for adapter in &self.adapters {
            adapter.shutdown().await;
        }
        self.ctx.sessions.close_all();

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Runtime task ended abnormally");
            }
        }
        info!("Courier runtime stopped");
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`CourierRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<CourierRuntime> {
        let config = self.config_loader.load()?;
        Ok(CourierRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
