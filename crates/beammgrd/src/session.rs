//! Device session lifecycle.
//!
//! A session is the explicit context object for one connected board:
//! connect, use, disconnect. It owns the register port handle and the
//! process-lifetime arbitration token, and reads the firmware identity
//! registers at connect time. At most one session is open per
//! controlling process.

use crate::arbiter::ScopeToken;
use crate::error::BeamResult;
use chrono::{TimeZone, Utc};
use mbrx_fpga::{names, RegisterPort};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Firmware identity, read from the `rcs_*` registers at connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Raw build identifier word.
    pub id: u32,
    /// Firmware version, major in the high half of `rcs_ver`.
    pub version: (u16, u16),
    /// Build time as a Unix timestamp.
    pub timestamp: u32,
}

impl FirmwareInfo {
    /// The build identifier as printable ASCII, as encoded by the
    /// firmware toolflow.
    pub fn tag(&self) -> String {
        self.id
            .to_be_bytes()
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let built = Utc
            .timestamp_opt(self.timestamp as i64, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            f,
            "{} v{}.{} ({})",
            self.tag(),
            self.version.0,
            self.version.1,
            built
        )
    }
}

/// One active connection to a board's register interface.
///
/// All register operations in the control plane go through the port
/// owned here; dropping or disconnecting the session tears the port
/// down with it, so no operation can outlive its session.
pub struct DeviceSession {
    board: String,
    port: Arc<dyn RegisterPort>,
    firmware: FirmwareInfo,
    token: ScopeToken,
}

impl DeviceSession {
    /// Connects to a board over an established register port and reads
    /// its firmware identity.
    pub async fn connect(board: impl Into<String>, port: Arc<dyn RegisterPort>) -> BeamResult<Self> {
        let board = board.into();
        info!(board = %board, "connecting");

        let id = port.read_u32(names::RCS_ID).await?;
        let ver = port.read_u32(names::RCS_VER).await?;
        let timestamp = port.read_u32(names::RCS_TIMESTAMP).await?;
        let firmware = FirmwareInfo {
            id,
            version: ((ver >> 16) as u16, ver as u16),
            timestamp,
        };

        let token = ScopeToken::generate();
        info!(board = %board, firmware = %firmware, token = %token, "connected");

        Ok(DeviceSession {
            board,
            port,
            firmware,
            token,
        })
    }

    /// The board this session is connected to.
    pub fn board(&self) -> &str {
        &self.board
    }

    /// The register port handle.
    pub fn port(&self) -> Arc<dyn RegisterPort> {
        self.port.clone()
    }

    /// Firmware identity read at connect time.
    pub fn firmware(&self) -> FirmwareInfo {
        self.firmware
    }

    /// This process's snapshot arbitration token.
    pub fn token(&self) -> ScopeToken {
        self.token
    }

    /// Tears the session down. Consumes the session, so no further
    /// operation can be issued through it.
    pub async fn disconnect(self) {
        info!(board = %self.board, "disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrx_fpga::SimRegisterPort;
    use pretty_assertions::assert_eq;

    fn seeded_port() -> Arc<SimRegisterPort> {
        let port = SimRegisterPort::new();
        port.set_register(names::RCS_ID, u32::from_be_bytes(*b"seti"));
        port.set_register(names::RCS_VER, 1 << 16 | 172);
        port.set_register(names::RCS_TIMESTAMP, 1_600_000_000);
        Arc::new(port)
    }

    #[tokio::test]
    async fn test_connect_reads_firmware() {
        let session = DeviceSession::connect("r1745", seeded_port()).await.unwrap();
        assert_eq!(session.board(), "r1745");
        assert_eq!(session.firmware().version, (1, 172));
        assert_eq!(session.firmware().tag(), "seti");
    }

    #[tokio::test]
    async fn test_connect_fails_without_firmware_registers() {
        let port = Arc::new(SimRegisterPort::new());
        assert!(DeviceSession::connect("r1745", port).await.is_err());
    }

    #[test]
    fn test_firmware_display() {
        let fw = FirmwareInfo {
            id: u32::from_be_bytes(*b"seti"),
            version: (1, 172),
            timestamp: 0,
        };
        assert_eq!(fw.to_string(), "seti v1.172 (1970-01-01 00:00:00)");
    }
}
