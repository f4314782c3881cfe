//! In-memory register file.
//!
//! `SimRegisterPort` stands in for a live device: it backs the daemon's
//! `--sim` mode and every test that needs to observe register traffic.
//! All mutating operations are recorded in an operation journal so tests
//! can assert exactly what reached the "hardware".

use crate::{PortResult, RegisterPort, Snapshot, SnapshotOptions, TransportError};
use async_trait::async_trait;
use mbrx_types::MacAddress;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// One recorded mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortOp {
    WriteU32 {
        name: String,
        value: u32,
    },
    WriteBytes {
        name: String,
        offset: usize,
        data: Vec<u8>,
    },
    StartTap {
        device: String,
        core: String,
        mac: MacAddress,
        ip: Ipv4Addr,
        port: u16,
    },
    StopTap {
        device: String,
    },
    Snapshot {
        name: String,
    },
}

/// A register that advances on its own, like `sys_clkcounter`.
#[derive(Debug, Clone)]
struct Counter {
    base: u32,
    hz: f64,
    origin: Instant,
}

#[derive(Default)]
struct SimState {
    registers: HashMap<String, u32>,
    memory: HashMap<String, Vec<u8>>,
    snapshots: HashMap<String, Vec<u8>>,
    taps: HashMap<String, (String, MacAddress, Ipv4Addr, u16)>,
    counters: HashMap<String, Counter>,
    failing: HashSet<String>,
    journal: Vec<PortOp>,
}

/// Software register file implementing [`RegisterPort`].
///
/// Reads of unknown registers fail with
/// [`TransportError::RegisterNotFound`] (catching name typos in tests);
/// writes create the register. Byte windows and snapshot sources are
/// sparse and zero-filled until loaded.
#[derive(Default)]
pub struct SimRegisterPort {
    state: Mutex<SimState>,
}

impl SimRegisterPort {
    /// Creates an empty register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or overwrites a register value without journaling.
    pub fn set_register(&self, name: &str, value: u32) {
        self.state
            .lock()
            .unwrap()
            .registers
            .insert(name.to_string(), value);
    }

    /// Current value of a register, if present.
    pub fn register(&self, name: &str) -> Option<u32> {
        self.state.lock().unwrap().registers.get(name).copied()
    }

    /// Loads a byte window (e.g. a fabric core's memory) without
    /// journaling.
    pub fn load_memory(&self, name: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .memory
            .insert(name.to_string(), bytes);
    }

    /// Current contents of a byte window.
    pub fn memory(&self, name: &str) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .memory
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Loads the buffer a capture scope will return.
    pub fn load_snapshot(&self, name: &str, data: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .insert(name.to_string(), data);
    }

    /// Installs a free-running counter register advancing at `hz`.
    pub fn install_counter(&self, name: &str, base: u32, hz: f64) {
        self.state.lock().unwrap().counters.insert(
            name.to_string(),
            Counter {
                base,
                hz,
                origin: Instant::now(),
            },
        );
    }

    /// Makes every operation touching `name` fail with a retryable
    /// timeout until cleared.
    pub fn fail_on(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.to_string());
    }

    /// Clears an injected fault.
    pub fn clear_fault(&self, name: &str) {
        self.state.lock().unwrap().failing.remove(name);
    }

    /// The recorded tap binding for a fabric device, if started.
    pub fn tap(&self, device: &str) -> Option<(String, MacAddress, Ipv4Addr, u16)> {
        self.state.lock().unwrap().taps.get(device).cloned()
    }

    /// Snapshot of the operation journal.
    pub fn journal(&self) -> Vec<PortOp> {
        self.state.lock().unwrap().journal.clone()
    }

    /// Clears the operation journal.
    pub fn clear_journal(&self) {
        self.state.lock().unwrap().journal.clear();
    }

    /// Number of journaled 32-bit writes to a register.
    pub fn write_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .journal
            .iter()
            .filter(|op| matches!(op, PortOp::WriteU32 { name: n, .. } if n == name))
            .count()
    }

    fn check_fault(state: &SimState, operation: &str, name: &str) -> PortResult<()> {
        if state.failing.contains(name) {
            return Err(TransportError::timeout(operation, name));
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterPort for SimRegisterPort {
    async fn read_u32(&self, name: &str) -> PortResult<u32> {
        let state = self.state.lock().unwrap();
        Self::check_fault(&state, "read", name)?;

        if let Some(counter) = state.counters.get(name) {
            let elapsed = counter.origin.elapsed().as_secs_f64();
            let ticks = (elapsed * counter.hz) as u64;
            return Ok(counter.base.wrapping_add(ticks as u32));
        }
        state
            .registers
            .get(name)
            .copied()
            .ok_or_else(|| TransportError::register_not_found(name))
    }

    async fn write_u32(&self, name: &str, value: u32) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&state, "write", name)?;

        state.registers.insert(name.to_string(), value);
        state.journal.push(PortOp::WriteU32 {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    async fn read_bytes(&self, name: &str, len: usize) -> PortResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&state, "read", name)?;

        let window = state.memory.entry(name.to_string()).or_default();
        if window.len() < len {
            window.resize(len, 0);
        }
        Ok(window[..len].to_vec())
    }

    async fn write_bytes(&self, name: &str, data: &[u8], offset: usize) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&state, "write", name)?;

        let window = state.memory.entry(name.to_string()).or_default();
        if window.len() < offset + data.len() {
            window.resize(offset + data.len(), 0);
        }
        window[offset..offset + data.len()].copy_from_slice(data);
        state.journal.push(PortOp::WriteBytes {
            name: name.to_string(),
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    async fn start_tap(
        &self,
        device: &str,
        core: &str,
        mac: MacAddress,
        ip: Ipv4Addr,
        port: u16,
    ) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&state, "start_tap", device)?;

        debug!(%device, %mac, %ip, port, "sim tap started");
        state
            .taps
            .insert(device.to_string(), (core.to_string(), mac, ip, port));
        state.journal.push(PortOp::StartTap {
            device: device.to_string(),
            core: core.to_string(),
            mac,
            ip,
            port,
        });
        Ok(())
    }

    async fn stop_tap(&self, device: &str) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&state, "stop_tap", device)?;

        if state.taps.remove(device).is_none() {
            return Err(TransportError::TapNotStarted {
                device: device.to_string(),
            });
        }
        state.journal.push(PortOp::StopTap {
            device: device.to_string(),
        });
        Ok(())
    }

    async fn trigger_snapshot(
        &self,
        name: &str,
        _options: SnapshotOptions,
    ) -> PortResult<Snapshot> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&state, "snapshot", name)?;

        let data = state
            .snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::register_not_found(name))?;
        state.journal.push(PortOp::Snapshot {
            name: name.to_string(),
        });
        Ok(Snapshot {
            length: data.len(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_register_read_write() {
        let port = SimRegisterPort::new();
        assert!(matches!(
            port.read_u32("u0_fft_shift").await,
            Err(TransportError::RegisterNotFound { .. })
        ));

        port.write_u32("u0_fft_shift", 0xFFFF).await.unwrap();
        assert_eq!(port.read_u32("u0_fft_shift").await.unwrap(), 0xFFFF);
        assert_eq!(port.write_count("u0_fft_shift"), 1);
    }

    #[tokio::test]
    async fn test_seeding_is_not_journaled() {
        let port = SimRegisterPort::new();
        port.set_register("reset", 0);
        assert_eq!(port.journal(), vec![]);
        assert_eq!(port.read_u32("reset").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_byte_window() {
        let port = SimRegisterPort::new();
        port.write_bytes("xgbe0_core", &[0xAB; 8], 0x3000).await.unwrap();
        let mem = port.memory("xgbe0_core");
        assert_eq!(&mem[0x3000..0x3008], &[0xAB; 8]);
        // Unwritten regions read back as zeros.
        assert_eq!(port.read_bytes("xgbe0_core", 4).await.unwrap(), vec![0; 4]);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let port = SimRegisterPort::new();
        port.set_register("u0_gain", 1);
        port.fail_on("u0_gain");

        let err = port.read_u32("u0_gain").await.unwrap_err();
        assert!(err.is_retryable());

        port.clear_fault("u0_gain");
        assert_eq!(port.read_u32("u0_gain").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tap_lifecycle() {
        let port = SimRegisterPort::new();
        let ip = Ipv4Addr::new(192, 168, 16, 221);

        assert!(matches!(
            port.stop_tap("xgbe0").await,
            Err(TransportError::TapNotStarted { .. })
        ));

        port.start_tap("xgbe0", "xgbe0_core", MacAddress::for_ip(ip), ip, 33333)
            .await
            .unwrap();
        assert!(port.tap("xgbe0").is_some());

        port.stop_tap("xgbe0").await.unwrap();
        assert!(port.tap("xgbe0").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_source() {
        let port = SimRegisterPort::new();
        port.load_snapshot("zdok0_scope", vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let snap = port
            .trigger_snapshot("zdok0_scope", SnapshotOptions::triggered())
            .await
            .unwrap();
        assert_eq!(snap.length, 8);
        assert_eq!(snap.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        assert!(port
            .trigger_snapshot("zdok1_scope", SnapshotOptions::triggered())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_counter_register() {
        let port = SimRegisterPort::new();
        port.install_counter("sys_clkcounter", 100, 0.0);
        assert_eq!(port.read_u32("sys_clkcounter").await.unwrap(), 100);
    }
}
