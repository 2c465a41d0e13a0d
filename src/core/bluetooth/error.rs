//! Error type for link supervision

use std::time::Duration;
use thiserror::Error;

/// Errors raised while discovering, connecting to or talking to the peripheral.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// No usable Bluetooth adapter right now. The adapter may come back, so this is retried.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// The platform refused Bluetooth access. Not retried automatically.
    #[error("Bluetooth permission denied: {0}")]
    PermissionDenied(String),

    /// The scan ran out of time without seeing the device.
    #[error("device {name:?} not found within {timeout:?}")]
    NotFound { name: String, timeout: Duration },

    /// The transport failed to connect or to discover characteristics.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The peripheral exposes no characteristic matching a required capability.
    #[error("no {0} characteristic found")]
    CharacteristicNotFound(&'static str),

    /// Writing to the peripheral failed.
    #[error("write failed: {0}")]
    Write(String),

    /// A reconnect attempt lost its race against the timer.
    #[error("reconnect timed out after {0:?}")]
    Timeout(Duration),

    /// The attempt was superseded or abandoned before it finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl LinkError {
    /// Whether the liveness loop should keep retrying after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PermissionDenied(_))
    }
}
