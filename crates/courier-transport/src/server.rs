//! Shared server for the HTTP and WebSocket transports.
//!
//! Every enabled adapter contributes its routes to one axum [`Router`], bound
//! once on the configured address:
//!
//! ```text
//! 0.0.0.0:8080
//! ├── GET  /message, /event, /all   → WebSocket channels
//! ├── POST /verify, /bind, /release → session routes
//! ├── GET  /fetchMessage, ...        → poll routes
//! └── GET|POST /{command}            → generic actions
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use courier_core::{BoxedAdapter, CourierContext};

use crate::cors::cors_layer;
use crate::middleware::AccessLayer;

#[cfg(feature = "http")]
use crate::http::HttpAdapter;
#[cfg(feature = "webhook")]
use crate::webhook::WebhookAdapter;
#[cfg(feature = "ws")]
use crate::ws::WsAdapter;

// ─── Adapter set ──────────────────────────────────────────────────────────────

/// The transport adapters a gateway instance runs.
#[derive(Default, Clone)]
pub struct TransportSet {
    #[cfg(feature = "http")]
    pub http: Option<Arc<HttpAdapter>>,
    #[cfg(feature = "ws")]
    pub ws: Option<Arc<WsAdapter>>,
    #[cfg(feature = "webhook")]
    pub webhook: Option<Arc<WebhookAdapter>>,
    /// Hosts allowed to call the routes from a browser; empty disables CORS.
    pub cors: Vec<String>,
}

impl TransportSet {
    /// Adapters in delivery order, for the event hub.
    pub fn adapters(&self) -> Vec<BoxedAdapter> {
        let mut adapters: Vec<BoxedAdapter> = Vec::new();
        #[cfg(feature = "http")]
        if let Some(http) = &self.http {
            adapters.push(http.clone());
        }
        #[cfg(feature = "ws")]
        if let Some(ws) = &self.ws {
            adapters.push(ws.clone());
        }
        #[cfg(feature = "webhook")]
        if let Some(webhook) = &self.webhook {
            adapters.push(webhook.clone());
        }
        adapters
    }

    pub fn is_empty(&self) -> bool {
        self.adapters().is_empty()
    }

    /// Merges the routes of every served adapter behind the access middleware
    /// and, when hosts are configured, the CORS policy.
    pub fn router(&self, ctx: &CourierContext) -> Router {
        #[allow(unused_mut)]
        let mut router = Router::new();

        #[cfg(feature = "ws")]
        if let Some(ws) = &self.ws {
            router = router.merge(crate::ws::routes::router(ctx.clone(), ws.clone()));
        }
        #[cfg(feature = "http")]
        if let Some(http) = &self.http {
            router = router.merge(crate::http::routes::router(ctx.clone(), http.clone()));
        }

        let router = router.layer(AccessLayer::new(ctx.debug, ctx.debug));
        match cors_layer(&self.cors) {
            Some(cors) => router.layer(cors),
            None => router,
        }
    }
}

// ─── Serving ──────────────────────────────────────────────────────────────────

/// A running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl ServerHandle {
    /// The bound address, including an ephemeral port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Serves `router` on `listener` until `shutdown` is cancelled.
pub fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<ServerHandle> {
    let local_addr = listener.local_addr()?;
    let token = shutdown.clone();

    tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
        if let Err(e) = server.await {
            error!(addr = %local_addr, error = %e, "Server error");
        }
        info!(addr = %local_addr, "Server shut down");
    });

    info!(addr = %local_addr, "Server listening");
    Ok(ServerHandle {
        local_addr,
        shutdown,
    })
}

/// Binds `addr` and serves `router` on it.
pub async fn bind(
    addr: &str,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<ServerHandle> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, router, shutdown)
}
