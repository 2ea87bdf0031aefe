//! # Courier Transport
//!
//! Wire transports for the Courier bot gateway. Each transport is a
//! [`TransportAdapter`](courier_core::TransportAdapter) fed by the core
//! event hub, plus the routes its clients talk to.
//!
//! ## Features
//!
//! - `http`: polling adapter with per-session event caches and action routes
//! - `ws`: WebSocket push channels (`/message`, `/event`, `/all`)
//! - `webhook`: outbound POSTs to configured endpoints
//! - `full` (default): all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  courier-runtime    │  (config, lifecycle)
//! ├─────────────────────┤
//! │  courier-transport  │  <- This crate (adapters, routes, middleware)
//! ├─────────────────────┤
//! │  courier-core       │  (sessions, hub, actions)
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_transport::{HttpAdapter, HttpConfig, TransportSet, server};
//!
//! let transports = TransportSet {
//!     http: Some(Arc::new(HttpAdapter::new(HttpConfig::default()))),
//!     ..Default::default()
//! };
//! let hub = EventHub::new(sessions, transports.adapters(), codec, HubConfig::default());
//! let handle = server::bind("0.0.0.0:8080", transports.router(&ctx), token).await?;
//! ```

pub mod cors;
pub mod error;
pub mod middleware;
pub mod server;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "ws")]
pub mod ws;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use cors::cors_layer;
pub use error::{HttpError, HttpResult, TracedError};
pub use middleware::{AccessLayer, AccessService, MAX_BODY_BYTES};
pub use server::{ServerHandle, TransportSet};

#[cfg(feature = "http")]
pub use http::{EventCache, HttpAdapter, HttpConfig, PollOrder};

#[cfg(feature = "ws")]
pub use ws::{WsAdapter, WsConfig};

#[cfg(feature = "webhook")]
pub use webhook::{WebhookAdapter, WebhookConfig};
