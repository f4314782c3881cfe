//! The register access port trait.

use crate::PortResult;
use async_trait::async_trait;
use mbrx_types::MacAddress;
use std::net::Ipv4Addr;
use std::time::Duration;

/// One captured buffer from the device's diagnostic capture engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Number of valid bytes captured.
    pub length: usize,
    /// Raw capture data.
    pub data: Vec<u8>,
}

/// Capture options for [`RegisterPort::trigger_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Force a trigger instead of waiting for the hardware trigger line.
    pub man_trig: bool,
    /// Treat every cycle as valid instead of waiting for the valid line.
    pub man_valid: bool,
    /// How long the transport may wait for the capture to complete.
    pub wait_period: Duration,
}

impl SnapshotOptions {
    /// Manually triggered capture (used for ADC scopes).
    pub fn triggered() -> Self {
        SnapshotOptions {
            man_trig: true,
            ..Self::default()
        }
    }

    /// Free-running capture that accepts every cycle (used for
    /// accumulator scopes, which trigger themselves).
    pub fn free_running() -> Self {
        Self::default()
    }
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        SnapshotOptions {
            man_trig: false,
            man_valid: true,
            wait_period: Duration::from_secs(10),
        }
    }
}

/// Synchronous access to the named registers, byte windows, tap
/// interfaces and capture engine of one device.
///
/// Implementations wrap a remote transport; every operation may block on
/// it and may fail with a [`crate::TransportError`]. All methods take
/// `&self`: a port is shared between the foreground control path and the
/// background snapshot poller.
#[async_trait]
pub trait RegisterPort: Send + Sync {
    /// Reads a named 32-bit register.
    async fn read_u32(&self, name: &str) -> PortResult<u32>;

    /// Writes a named 32-bit register.
    async fn write_u32(&self, name: &str, value: u32) -> PortResult<()>;

    /// Reads `len` bytes from the start of a named memory window.
    async fn read_bytes(&self, name: &str, len: usize) -> PortResult<Vec<u8>>;

    /// Writes raw bytes into a named memory window at a byte offset.
    async fn write_bytes(&self, name: &str, data: &[u8], offset: usize) -> PortResult<()>;

    /// Starts a tap/offload interface bound to a MAC/IP/port triple.
    async fn start_tap(
        &self,
        device: &str,
        core: &str,
        mac: MacAddress,
        ip: Ipv4Addr,
        port: u16,
    ) -> PortResult<()>;

    /// Stops a tap/offload interface.
    ///
    /// Fails with [`crate::TransportError::TapNotStarted`] when no tap is
    /// running for `device`.
    async fn stop_tap(&self, device: &str) -> PortResult<()>;

    /// Arms the named capture scope, waits for it to fill and returns
    /// the captured buffer.
    async fn trigger_snapshot(&self, name: &str, options: SnapshotOptions) -> PortResult<Snapshot>;
}
