//! Runtime error types.

use thiserror::Error;

use courier_core::CourierError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Adapter construction or initialization failed.
    #[error("Adapter error: {0}")]
    Adapter(#[from] CourierError),

    /// The adapter is configured but its transport feature is not compiled in.
    #[error("Adapter '{0}' is not available in this build")]
    AdapterUnavailable(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called twice.
    #[error("Runtime already started")]
    AlreadyStarted,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
