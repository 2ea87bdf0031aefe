//! Shared-secret verification.

use tracing::warn;

use crate::error::{CourierError, CourierResult};

/// Validates the client-presented verify key.
///
/// The gate fails closed: with verification enabled, a missing configured key
/// rejects every client. Nothing is created or mutated on failure.
#[derive(Debug, Clone)]
pub struct AuthGate {
    verify_key: Option<String>,
    enabled: bool,
}

impl AuthGate {
    pub fn new(verify_key: Option<String>, enabled: bool) -> Self {
        Self {
            verify_key,
            enabled,
        }
    }

    /// A gate that accepts everything (verification off, or single mode).
    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks `presented` against the configured key.
    pub fn verify(&self, presented: Option<&str>) -> CourierResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match (self.verify_key.as_deref(), presented) {
            (Some(expected), Some(given))
                if constant_time_eq(expected.as_bytes(), given.as_bytes()) =>
            {
                Ok(())
            }
            (None, _) => {
                warn!("Verification is enabled but no verify key is configured");
                Err(CourierError::AuthFailure)
            }
            _ => Err(CourierError::AuthFailure),
        }
    }
}

/// Constant-time comparison for auth validation.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
