//! Transport error taxonomy for register port operations.

use thiserror::Error;

/// Result type alias for register port operations.
pub type PortResult<T> = Result<T, TransportError>;

/// Errors surfaced by a [`crate::RegisterPort`] implementation.
///
/// Transport failures abort the operation that hit them; callers never
/// guess at partial state. Transient variants are expected to be retried
/// by the caller on its own schedule (the snapshot poller retries on the
/// next poll cycle).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The named register does not exist in the device's register map.
    #[error("register '{name}' not found on device")]
    RegisterNotFound {
        /// The register name that failed to resolve.
        name: String,
    },

    /// The device did not answer within the transport's deadline.
    #[error("timeout during {operation} on '{name}'")]
    Timeout {
        /// The operation that timed out (e.g. "read", "snapshot").
        operation: String,
        /// The register or scope name involved.
        name: String,
    },

    /// A tap/offload operation was issued for an interface that is not
    /// started.
    #[error("tap interface '{device}' is not started")]
    TapNotStarted {
        /// The fabric device name.
        device: String,
    },

    /// A tap/offload operation failed on the device side.
    #[error("tap operation failed on '{device}': {message}")]
    Tap {
        /// The fabric device name.
        device: String,
        /// Device-reported failure detail.
        message: String,
    },

    /// The underlying connection failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session behind this port has been torn down.
    #[error("device connection closed")]
    Closed,
}

impl TransportError {
    /// Creates a register-not-found error.
    pub fn register_not_found(name: impl Into<String>) -> Self {
        Self::RegisterNotFound { name: name.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            name: name.into(),
        }
    }

    /// Creates a tap failure error.
    pub fn tap(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tap {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition that
    /// may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout { .. } | TransportError::Io(_))
    }
}
