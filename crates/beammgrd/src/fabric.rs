//! Network-fabric link bring-up and runtime reconfiguration.
//!
//! Each unit streams its output through four 10GbE fabric links. A link
//! comes up in a fixed sequence: derive the MAC from the link's own IP,
//! start the tap/offload interface, program the destination registers,
//! then apply the ARP workaround. Bring-up is not transactional: a
//! failed step aborts the rest and the whole sequence is safe to rerun.

use crate::error::{BeamError, BeamResult};
use crate::store::write_logged;
use byteorder::{BigEndian, ByteOrder};
use mbrx_fpga::names::{self, fields};
use mbrx_fpga::{RegisterPort, TransportError};
use mbrx_types::{Endpoint, MacAddress, Unit};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Decoded header of a fabric core's memory window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreInfo {
    /// Configured MAC address.
    pub mac: MacAddress,
    /// Gateway address word.
    pub gateway: u32,
    /// Own IP address.
    pub ip: Ipv4Addr,
    /// Fabric UDP port.
    pub port: u16,
    /// Fabric enable flag.
    pub enabled: bool,
}

fn check_link(link: usize) -> BeamResult<()> {
    if link >= names::FABRIC_LINKS_PER_UNIT {
        return Err(BeamError::InvalidFabricLink { link });
    }
    Ok(())
}

/// Brings up one fabric link: tap start, destination registers, ARP
/// workaround. Re-invocation is idempotent; nothing is rolled back on
/// failure.
pub async fn bring_up(
    port: &dyn RegisterPort,
    unit: Unit,
    link: usize,
    own: Endpoint,
    dest: Endpoint,
) -> BeamResult<()> {
    check_link(link)?;
    let device = names::fabric_device(unit, link);
    let core = names::fabric_core(unit, link);
    let mac = MacAddress::for_ip(own.ip);

    info!(%device, %mac, %own, %dest, "bringing up fabric link");
    port.start_tap(&device, &core, mac, own.ip, own.port).await?;

    write_logged(
        port,
        &names::fabric_reg(unit, link, fields::DEST_IP),
        dest.ip_bits(),
    )
    .await?;
    write_logged(
        port,
        &names::fabric_reg(unit, link, fields::DEST_PORT),
        dest.port as u32,
    )
    .await?;

    // The offload mechanism fills the destination's ARP slot with the
    // broadcast address, which breaks downstream switching; zero the
    // entry instead.
    let offset = names::arp_entry_offset(dest.ip_bits());
    port.write_bytes(&core, &[0u8; names::ARP_ENTRY_BYTES], offset).await?;

    Ok(())
}

/// Rebinds a link's tap/offload interface to a new own endpoint.
///
/// Stops the running tap first, tolerating a tap that was never
/// started, then restarts it with the MAC derived from the new IP.
pub async fn change_endpoint(
    port: &dyn RegisterPort,
    unit: Unit,
    link: usize,
    own: Endpoint,
) -> BeamResult<()> {
    check_link(link)?;
    let device = names::fabric_device(unit, link);
    let core = names::fabric_core(unit, link);

    match port.stop_tap(&device).await {
        Ok(()) => {}
        Err(TransportError::TapNotStarted { .. }) => {
            debug!(%device, "tap was not started");
        }
        Err(e) => return Err(e.into()),
    }

    let mac = MacAddress::for_ip(own.ip);
    info!(%device, %mac, %own, "rebinding fabric link");
    port.start_tap(&device, &core, mac, own.ip, own.port).await?;
    Ok(())
}

/// Reads and decodes the header region of a fabric core window.
pub async fn read_core_info(
    port: &dyn RegisterPort,
    unit: Unit,
    link: usize,
) -> BeamResult<CoreInfo> {
    check_link(link)?;
    let core = names::fabric_core(unit, link);
    let raw = port.read_bytes(&core, names::CORE_INFO_BYTES).await?;

    let mut words = [0u32; 12];
    BigEndian::read_u32_into(&raw, &mut words);

    // 0x00: MAC high word, 0x04: MAC low word, 0x0c: gateway,
    // 0x10: own IP, 0x20: port (low half) and fabric enable (bit 16).
    Ok(CoreInfo {
        mac: MacAddress::from_u64((words[0] as u64) << 32 | words[1] as u64),
        gateway: words[3],
        ip: Ipv4Addr::from(words[4]),
        port: (words[8] & 0xFFFF) as u16,
        enabled: words[8] & 0x1_0000 != 0,
    })
}
