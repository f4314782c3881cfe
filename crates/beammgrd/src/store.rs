//! Configuration state store.
//!
//! The store keeps an in-memory mirror of the device configuration, per
//! unit plus board level. Every mutation goes through a delta check:
//! a value equal to the mirror issues no device traffic at all (writes
//! can have side effects such as resets, so redundant ones are not
//! harmless), and the mirror is updated only after the device write
//! succeeded. Refresh overwrites the mirror from the device
//! unconditionally and is required once per unit before mutation.
//!
//! All registry mutation originates from the single control task, so
//! the store itself carries no lock; introducing a second control
//! thread would require wrapping `set` in a mutex to preserve the
//! write-only-on-delta invariant.

use crate::error::{BeamError, BeamResult};
use crate::fabric;
use mbrx_fpga::names::{self, fields};
use mbrx_fpga::{PortResult, RegisterPort};
use mbrx_types::{uint48, BitSelect, DigitalGain, Endpoint, Unit};
use std::sync::Arc;
use tracing::{info, warn};

/// Valid beam identifiers for the 19-beam receiver.
pub const BEAM_ID_RANGE: std::ops::RangeInclusive<u32> = 1..=19;

/// Writes a register and logs the applied value in decimal and hex.
/// Every actual device write in the control plane funnels through here.
pub(crate) async fn write_logged(
    port: &dyn RegisterPort,
    name: &str,
    value: u32,
) -> PortResult<()> {
    port.write_u32(name, value).await?;
    info!("wrote register {}={}({:X})", name, value, value);
    Ok(())
}

/// Mirrored per-unit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConfig {
    /// Beam identifier, valid range 1..=19.
    pub beam_id: u32,
    /// FFT shift schedule.
    pub fft_shift: u32,
    /// Digital gain pair.
    pub gain: DigitalGain,
    /// Accumulation length.
    pub acc_len: u32,
    /// Output bit-slice selectors.
    pub bit_select: BitSelect,
    /// Per-link destination endpoints.
    pub dest: [Endpoint; names::FABRIC_LINKS_PER_UNIT],
    /// Per-link fabric (own) endpoints, decoded from the core windows.
    pub fabric: [Endpoint; names::FABRIC_LINKS_PER_UNIT],
    /// Test-vector-generator enable bit for this unit.
    pub tvg: bool,
}

/// Mirrored board-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Noise-calibration start delay, in FPGA clocks.
    pub noisecal_delay: u64,
    /// Noise-calibration on period, in FPGA clocks.
    pub noisecal_on: u64,
    /// Noise-calibration off period, in FPGA clocks.
    pub noisecal_off: u64,
}

/// In-memory mirror of device configuration with delta-driven writes.
pub struct ConfigStore {
    port: Arc<dyn RegisterPort>,
    units: [Option<UnitConfig>; 2],
    board: Option<BoardConfig>,
}

impl ConfigStore {
    /// Creates a store over a register port. The mirror starts empty;
    /// call [`ConfigStore::refresh_unit`] and
    /// [`ConfigStore::refresh_board`] before mutating.
    pub fn new(port: Arc<dyn RegisterPort>) -> Self {
        ConfigStore {
            port,
            units: [None, None],
            board: None,
        }
    }

    /// The underlying register port.
    pub fn port(&self) -> Arc<dyn RegisterPort> {
        self.port.clone()
    }

    /// The mirrored configuration of a unit, if refreshed.
    pub fn unit(&self, unit: Unit) -> Option<&UnitConfig> {
        self.units[unit.index() as usize].as_ref()
    }

    /// The mirrored board-level configuration, if refreshed.
    pub fn board(&self) -> Option<&BoardConfig> {
        self.board.as_ref()
    }

    fn unit_ref(&self, unit: Unit) -> BeamResult<&UnitConfig> {
        self.units[unit.index() as usize]
            .as_ref()
            .ok_or_else(|| BeamError::not_refreshed(unit.to_string()))
    }

    fn unit_mut(&mut self, unit: Unit) -> BeamResult<&mut UnitConfig> {
        self.units[unit.index() as usize]
            .as_mut()
            .ok_or_else(|| BeamError::not_refreshed(unit.to_string()))
    }

    fn board_ref(&self) -> BeamResult<&BoardConfig> {
        self.board
            .as_ref()
            .ok_or_else(|| BeamError::not_refreshed("board"))
    }

    async fn write_register(&self, name: &str, value: u32) -> BeamResult<()> {
        write_logged(self.port.as_ref(), name, value).await?;
        Ok(())
    }

    /// Reads a 48-bit counter from its register pair.
    pub async fn read_uint48(&self, name: &str) -> BeamResult<u64> {
        let lo = self.port.read_u32(name).await?;
        let hi = self.port.read_u32(&names::hipart(name)).await?;
        Ok(uint48::join(lo, hi)?)
    }

    async fn write_uint48(&self, name: &str, value: u64) -> BeamResult<()> {
        let (lo, hi) = uint48::split(value)?;
        self.write_register(name, lo).await?;
        self.write_register(&names::hipart(name), hi).await?;
        Ok(())
    }

    /// Overwrites the board-level mirror from the device.
    pub async fn refresh_board(&mut self) -> BeamResult<()> {
        let noisecal_delay = self.read_uint48(fields::NOISECAL_DELAY).await?;
        let noisecal_on = self.read_uint48(fields::NOISECAL_ON).await?;
        let noisecal_off = self.read_uint48(fields::NOISECAL_OFF).await?;
        self.board = Some(BoardConfig {
            noisecal_delay,
            noisecal_on,
            noisecal_off,
        });
        Ok(())
    }

    /// Overwrites a unit's mirror from the device.
    pub async fn refresh_unit(&mut self, unit: Unit) -> BeamResult<()> {
        info!(%unit, "retrieving unit parameters");
        let port = self.port.clone();

        let beam_id = port.read_u32(&names::unit_reg(unit, fields::BEAM_ID)).await?;
        if !BEAM_ID_RANGE.contains(&beam_id) {
            warn!(%unit, beam_id, "device reports beam id outside 1..=19");
        }
        let fft_shift = port
            .read_u32(&names::unit_reg(unit, fields::FFT_SHIFT))
            .await?;
        let gain = DigitalGain::unpack(port.read_u32(&names::unit_reg(unit, fields::GAIN)).await?);
        let acc_len = port.read_u32(&names::unit_reg(unit, fields::ACC_LEN)).await?;
        let bit_select = BitSelect::unpack(
            port.read_u32(&names::unit_reg(unit, fields::BIT_SELECT)).await? as u8,
        );

        let zero = Endpoint::from_bits(0, 0);
        let mut dest = [zero; names::FABRIC_LINKS_PER_UNIT];
        let mut fabric_own = [zero; names::FABRIC_LINKS_PER_UNIT];
        for link in 0..names::FABRIC_LINKS_PER_UNIT {
            let ip = port
                .read_u32(&names::fabric_reg(unit, link, fields::DEST_IP))
                .await?;
            let dport = port
                .read_u32(&names::fabric_reg(unit, link, fields::DEST_PORT))
                .await?;
            dest[link] = Endpoint::from_bits(ip, dport as u16);

            let core = fabric::read_core_info(port.as_ref(), unit, link).await?;
            fabric_own[link] = Endpoint::new(core.ip, core.port);
        }

        let tvg = port.read_u32(names::REG_USE_TVG).await? & unit.bit() != 0;

        self.units[unit.index() as usize] = Some(UnitConfig {
            beam_id,
            fft_shift,
            gain,
            acc_len,
            bit_select,
            dest,
            fabric: fabric_own,
            tvg,
        });
        Ok(())
    }

    /// Sets the beam identifier for a unit.
    pub async fn set_beam_id(&mut self, unit: Unit, id: u32) -> BeamResult<()> {
        if !BEAM_ID_RANGE.contains(&id) {
            return Err(BeamError::InvalidBeamId { id });
        }
        if self.unit_ref(unit)?.beam_id == id {
            return Ok(());
        }
        self.write_register(&names::unit_reg(unit, fields::BEAM_ID), id).await?;
        self.unit_mut(unit)?.beam_id = id;
        Ok(())
    }

    /// Sets the FFT shift schedule for a unit.
    pub async fn set_fft_shift(&mut self, unit: Unit, value: u32) -> BeamResult<()> {
        if self.unit_ref(unit)?.fft_shift == value {
            return Ok(());
        }
        self.write_register(&names::unit_reg(unit, fields::FFT_SHIFT), value).await?;
        self.unit_mut(unit)?.fft_shift = value;
        Ok(())
    }

    /// Sets one channel of a unit's digital gain pair.
    pub async fn set_digital_gain(
        &mut self,
        unit: Unit,
        channel: usize,
        value: u16,
    ) -> BeamResult<()> {
        if channel > 1 {
            return Err(BeamError::config(format!(
                "gain channel index {channel} out of range"
            )));
        }
        let current = self.unit_ref(unit)?.gain;
        let updated = current.with_channel(channel, value);
        if updated == current {
            return Ok(());
        }
        self.write_register(&names::unit_reg(unit, fields::GAIN), updated.pack()).await?;
        self.unit_mut(unit)?.gain = updated;
        Ok(())
    }

    /// Sets the accumulation length for a unit.
    ///
    /// A changed length invalidates in-flight accumulation state, so
    /// the unit is reset right after the write.
    pub async fn set_acc_len(&mut self, unit: Unit, value: u32) -> BeamResult<()> {
        if self.unit_ref(unit)?.acc_len == value {
            return Ok(());
        }
        self.write_register(&names::unit_reg(unit, fields::ACC_LEN), value).await?;
        self.unit_mut(unit)?.acc_len = value;
        self.reset(unit).await?;
        Ok(())
    }

    /// Sets one of the four output bit-slice selectors for a unit.
    pub async fn set_bit_select(
        &mut self,
        unit: Unit,
        index: usize,
        value: u8,
    ) -> BeamResult<()> {
        let current = self.unit_ref(unit)?.bit_select;
        let updated = current.with_field(index, value)?;
        if updated == current {
            return Ok(());
        }
        self.write_register(
            &names::unit_reg(unit, fields::BIT_SELECT),
            updated.pack() as u32,
        )
        .await?;
        self.unit_mut(unit)?.bit_select = updated;
        Ok(())
    }

    /// Sets the destination endpoint of a fabric link.
    pub async fn set_dest_endpoint(
        &mut self,
        unit: Unit,
        link: usize,
        endpoint: Endpoint,
    ) -> BeamResult<()> {
        if link >= names::FABRIC_LINKS_PER_UNIT {
            return Err(BeamError::InvalidFabricLink { link });
        }
        if self.unit_ref(unit)?.dest[link] == endpoint {
            return Ok(());
        }
        self.write_register(
            &names::fabric_reg(unit, link, fields::DEST_IP),
            endpoint.ip_bits(),
        )
        .await?;
        self.write_register(
            &names::fabric_reg(unit, link, fields::DEST_PORT),
            endpoint.port as u32,
        )
        .await?;
        self.unit_mut(unit)?.dest[link] = endpoint;
        Ok(())
    }

    /// Rebinds the tap/offload interface of a fabric link to a new own
    /// endpoint.
    pub async fn set_fabric_endpoint(
        &mut self,
        unit: Unit,
        link: usize,
        endpoint: Endpoint,
    ) -> BeamResult<()> {
        if link >= names::FABRIC_LINKS_PER_UNIT {
            return Err(BeamError::InvalidFabricLink { link });
        }
        if self.unit_ref(unit)?.fabric[link] == endpoint {
            return Ok(());
        }
        fabric::change_endpoint(self.port.as_ref(), unit, link, endpoint).await?;
        self.unit_mut(unit)?.fabric[link] = endpoint;
        Ok(())
    }

    /// Enables or disables the test vector generator for a unit.
    ///
    /// The enable bits of both units share one register, so this is a
    /// read-modify-write against the live register rather than the
    /// mirror.
    pub async fn set_tvg(&mut self, unit: Unit, enabled: bool) -> BeamResult<()> {
        let current = self.port.read_u32(names::REG_USE_TVG).await?;
        let desired = if enabled {
            current | unit.bit()
        } else {
            current & !unit.bit()
        };
        if desired != current {
            self.write_register(names::REG_USE_TVG, desired).await?;
        }
        if let Some(cfg) = self.units[unit.index() as usize].as_mut() {
            cfg.tvg = enabled;
        }
        Ok(())
    }

    /// Sets the noise-calibration start delay.
    pub async fn set_noisecal_delay(&mut self, value: u64) -> BeamResult<()> {
        if self.board_ref()?.noisecal_delay == value {
            return Ok(());
        }
        self.write_uint48(fields::NOISECAL_DELAY, value).await?;
        if let Some(board) = self.board.as_mut() {
            board.noisecal_delay = value;
        }
        Ok(())
    }

    /// Sets the noise-calibration on period.
    pub async fn set_noisecal_on(&mut self, value: u64) -> BeamResult<()> {
        if self.board_ref()?.noisecal_on == value {
            return Ok(());
        }
        self.write_uint48(fields::NOISECAL_ON, value).await?;
        if let Some(board) = self.board.as_mut() {
            board.noisecal_on = value;
        }
        Ok(())
    }

    /// Sets the noise-calibration off period.
    pub async fn set_noisecal_off(&mut self, value: u64) -> BeamResult<()> {
        if self.board_ref()?.noisecal_off == value {
            return Ok(());
        }
        self.write_uint48(fields::NOISECAL_OFF, value).await?;
        if let Some(board) = self.board.as_mut() {
            board.noisecal_off = value;
        }
        Ok(())
    }

    /// Pulses an edge-triggered control register for a unit: a zero
    /// write followed by the unit's bit. The leading zero is what
    /// produces the rising edge; skipping it is a protocol violation.
    pub async fn pulse(&self, control: &str, unit: Unit) -> BeamResult<()> {
        self.write_register(control, 0).await?;
        self.write_register(control, unit.bit()).await?;
        Ok(())
    }

    /// Resets a unit's signal path.
    pub async fn reset(&self, unit: Unit) -> BeamResult<()> {
        self.pulse(names::REG_RESET, unit).await
    }

    /// Arms a unit's capture synchronization.
    pub async fn arm(&self, unit: Unit) -> BeamResult<()> {
        self.pulse(names::REG_ARM, unit).await
    }
}
