//! Error types for control-plane operations.

use mbrx_fpga::TransportError;
use mbrx_types::{CaptureError, ParseError, RangeError};
use thiserror::Error;

/// Result type alias for control-plane operations.
pub type BeamResult<T> = Result<T, BeamError>;

/// Errors that can occur during control-plane operations.
#[derive(Debug, Error)]
pub enum BeamError {
    /// A register read or write failed at the transport level. The
    /// operation is aborted; no partial-state guess is made.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A value exceeds its register's bit width; the write was not
    /// attempted.
    #[error(transparent)]
    Range(#[from] RangeError),

    /// A user-supplied string failed to parse; reported before any
    /// register write.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A capture buffer violated a protocol invariant; the sample is
    /// discarded.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Beam id outside the commissioned range.
    #[error("beam id {id} outside valid range 1..=19")]
    InvalidBeamId {
        /// The rejected beam id.
        id: u32,
    },

    /// Fabric link index outside the per-unit link count.
    #[error("fabric link index {link} outside valid range 0..4")]
    InvalidFabricLink {
        /// The rejected link index.
        link: usize,
    },

    /// The in-memory mirror has not been refreshed from the device.
    #[error("configuration for {scope} not refreshed from device")]
    NotRefreshed {
        /// The unit or board scope that is missing.
        scope: String,
    },

    /// Invalid daemon configuration (profile file, arbiter settings).
    #[error("invalid configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl BeamError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a not-refreshed error.
    pub fn not_refreshed(scope: impl Into<String>) -> Self {
        Self::NotRefreshed {
            scope: scope.into(),
        }
    }

    /// Returns true if this error indicates a transient condition that
    /// may succeed on retry (next poll cycle, next command).
    pub fn is_retryable(&self) -> bool {
        matches!(self, BeamError::Transport(t) if t.is_retryable())
    }
}
