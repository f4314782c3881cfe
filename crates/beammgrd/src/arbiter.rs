//! Snapshot arbitration over the shared scratchpad register.
//!
//! The capture engine is a single shared resource, and the only
//! coordination primitive the device offers is one 32-bit scratchpad
//! register. Each client claims the engine by writing its token into
//! `sys_scratchpad` and returns it by restoring the idle sentinel.
//!
//! The protocol is a check-then-write on a remote word with no
//! atomicity: two participants can both observe the idle sentinel and
//! both write their tokens, in which case the loser runs its capture
//! without actually holding the engine. This TOCTOU window is a known,
//! accepted property of the register-level contract; the state machine
//! below keeps the two steps explicit so the race stays visible and
//! testable instead of hiding in interleaved statements.
//!
//! There is no upper bound on SEEKING and no steal policy: a holder
//! that dies between acquire and release wedges every participant until
//! the scratchpad is reset by hand. Release therefore runs on every
//! path out of [`ScopeArbiter::with_scope`], including capture failure.

use crate::error::{BeamError, BeamResult};
use mbrx_fpga::names::{SCOPE_IDLE, SYS_SCRATCHPAD};
use mbrx_fpga::{PortResult, RegisterPort};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

/// Default wait between scratchpad polls while another client holds it.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Process-lifetime arbitration token.
///
/// Drawn once per session from a non-cryptographic source; uniqueness
/// across concurrently running clients is statistical only (roughly
/// N²/2³³ collision odds for N clients), which matches the width of the
/// scratchpad word the protocol has to work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeToken(u32);

impl ScopeToken {
    /// Generates a fresh token, never equal to the idle sentinel.
    pub fn generate() -> Self {
        loop {
            let raw: u32 = rand::random();
            if raw != SCOPE_IDLE {
                return ScopeToken(raw);
            }
        }
    }

    /// The raw token word as written to the scratchpad.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Protocol phase of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbState {
    /// Polling the scratchpad until it reads as idle.
    Seeking,
    /// Idle observed; writing own token.
    Acquired,
    /// Running the capture sequence. No read-verify is performed first;
    /// the acquire race is accepted.
    Holding,
    /// Restoring the idle sentinel.
    Releasing,
}

/// Arbiter configuration.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Backoff between scratchpad polls; must be nonzero so SEEKING
    /// cannot saturate the transport.
    pub backoff: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Serializes access to the shared capture engine for one client.
pub struct ScopeArbiter {
    port: Arc<dyn RegisterPort>,
    token: ScopeToken,
    backoff: Duration,
}

impl ScopeArbiter {
    /// Creates an arbiter for a session's token.
    pub fn new(
        port: Arc<dyn RegisterPort>,
        token: ScopeToken,
        config: ArbiterConfig,
    ) -> BeamResult<Self> {
        if config.backoff.is_zero() {
            return Err(BeamError::config("arbiter backoff must be nonzero"));
        }
        Ok(ScopeArbiter {
            port,
            token,
            backoff: config.backoff,
        })
    }

    /// This client's token.
    pub fn token(&self) -> ScopeToken {
        self.token
    }

    /// Runs `body` while holding the capture engine.
    ///
    /// The idle sentinel is restored on every path out of the body,
    /// success or failure. A release failure after a successful capture
    /// is surfaced; after a failed capture it is logged and the capture
    /// error wins.
    pub async fn with_scope<T, F, Fut>(&self, body: F) -> BeamResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BeamResult<T>>,
    {
        self.acquire().await?;
        let result = body().await;
        let released = self.release().await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(body_err), released) => {
                if let Err(release_err) = released {
                    warn!(error = %release_err, "failed to release capture scope after error");
                }
                Err(body_err)
            }
        }
    }

    /// SEEKING → ACQUIRED → HOLDING.
    async fn acquire(&self) -> BeamResult<()> {
        let mut state = ArbState::Seeking;
        loop {
            match state {
                ArbState::Seeking => {
                    let holder = self.port.read_u32(SYS_SCRATCHPAD).await?;
                    if holder == SCOPE_IDLE {
                        state = ArbState::Acquired;
                    } else {
                        trace!("capture scope busy, holder {holder:08x}");
                        sleep(self.backoff).await;
                    }
                }
                ArbState::Acquired => {
                    // Blind write: the device offers no compare-and-swap,
                    // so another client may have claimed the scope since
                    // the idle read. Accepted race.
                    self.port.write_u32(SYS_SCRATCHPAD, self.token.value()).await?;
                    state = ArbState::Holding;
                }
                ArbState::Holding => {
                    debug!(token = %self.token, "capture scope acquired");
                    return Ok(());
                }
                ArbState::Releasing => unreachable!("release is not part of acquire"),
            }
        }
    }

    /// RELEASING: restore the idle sentinel unconditionally.
    async fn release(&self) -> PortResult<()> {
        self.port.write_u32(SYS_SCRATCHPAD, SCOPE_IDLE).await?;
        debug!(token = %self.token, "capture scope released");
        Ok(())
    }
}
