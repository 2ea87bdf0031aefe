//! Courier Runtime - orchestration layer for the Courier bot gateway.
//!
//! This crate provides:
//! - Layered configuration (`CourierConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`)
//! - Runtime orchestration (`CourierRuntime`): session engine, transports,
//!   event hub loop, idle sweeper and graceful shutdown
//!
//! # Transport Features
//!
//! Adapters named in `adapters` must be compiled in:
//!
//! - `http`: polling adapter and action routes
//! - `ws`: WebSocket push channels
//! - `webhook`: outbound POSTs
//! - `full-transport` (default): all of the above
//!
//! ```ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::new();
//!     runtime.register_bot(Arc::new(MyBot::new(12345)));
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder, RuntimeHandle};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for the logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
