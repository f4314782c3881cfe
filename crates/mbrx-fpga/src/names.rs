//! The firmware register naming contract.
//!
//! Register names are a bit-exact interface to the device: per-unit
//! fields carry the unit prefix (`u0_fft_shift`), fabric links are
//! numbered across units (`xgbe<link + 4*unit>_dest_ip`), the high word
//! of a 48-bit counter lives in `<name>_hipart`. Everything that builds
//! a register name lives here.

use mbrx_types::Unit;

/// Shared scratchpad register used as the snapshot arbitration token.
pub const SYS_SCRATCHPAD: &str = "sys_scratchpad";

/// Free-running clock counter used for reference-clock validation.
pub const SYS_CLKCOUNTER: &str = "sys_clkcounter";

/// Firmware identity registers.
pub const RCS_ID: &str = "rcs_id";
pub const RCS_VER: &str = "rcs_ver";
pub const RCS_TIMESTAMP: &str = "rcs_timestamp";

/// Edge-triggered control registers (one bit per unit).
pub const REG_RESET: &str = "reset";
pub const REG_ARM: &str = "arm";

/// Test-vector-generator enable register (one bit per unit).
pub const REG_USE_TVG: &str = "use_tvg";

/// Sentinel value meaning "scratchpad is idle, capture engine free".
pub const SCOPE_IDLE: u32 = 0x12345678;

/// Fabric links per unit.
pub const FABRIC_LINKS_PER_UNIT: usize = 4;

/// Byte offset of the ARP table inside a fabric core window.
pub const ARP_TABLE_BASE: usize = 0x3000;

/// Bytes per ARP table entry.
pub const ARP_ENTRY_BYTES: usize = 8;

/// Length of the decoded header region of a fabric core window.
pub const CORE_INFO_BYTES: usize = 48;

/// Spectrum scope channel suffixes, in capture order: the two
/// auto-correlations, then the real and imaginary cross terms.
pub const SPECTRUM_SCOPES: [&str; 4] = ["AA", "BB", "CR", "CI"];

/// Per-unit register field names.
pub mod fields {
    pub const BEAM_ID: &str = "beam_id";
    pub const FFT_SHIFT: &str = "fft_shift";
    pub const GAIN: &str = "gain";
    pub const ACC_LEN: &str = "acc_len";
    pub const BIT_SELECT: &str = "bit_select";

    // Per-fabric-link fields
    pub const DEST_IP: &str = "dest_ip";
    pub const DEST_PORT: &str = "dest_port";

    // Board-level 48-bit noise calibration counters
    pub const NOISECAL_DELAY: &str = "noisecal_delay";
    pub const NOISECAL_ON: &str = "noisecal_on";
    pub const NOISECAL_OFF: &str = "noisecal_off";
}

/// Builds a per-unit register name, e.g. `u0_fft_shift`.
pub fn unit_reg(unit: Unit, field: &str) -> String {
    format!("{}{}", unit.prefix(), field)
}

/// Builds a fabric device name, e.g. `xgbe6` for unit 1 link 2.
pub fn fabric_device(unit: Unit, link: usize) -> String {
    format!("xgbe{}", unit.fabric_index(link))
}

/// Builds a fabric core window name, e.g. `xgbe2_core`.
pub fn fabric_core(unit: Unit, link: usize) -> String {
    format!("{}_core", fabric_device(unit, link))
}

/// Builds a per-fabric-link register name, e.g. `xgbe2_dest_ip`.
pub fn fabric_reg(unit: Unit, link: usize, field: &str) -> String {
    format!("{}_{}", fabric_device(unit, link), field)
}

/// Builds the high-word register name of a 48-bit counter.
pub fn hipart(name: &str) -> String {
    format!("{name}_hipart")
}

/// Builds the ADC capture scope name for a unit, e.g. `zdok0_scope`.
pub fn adc_scope(unit: Unit) -> String {
    format!("zdok{}_scope", unit.index())
}

/// Builds a spectrum capture scope name, e.g. `u0_x4_vacc_scope_AA`.
pub fn spectrum_scope(unit: Unit, channel: &str) -> String {
    format!("{}x4_vacc_scope_{}", unit.prefix(), channel)
}

/// Byte offset of the ARP entry indexed by the low byte of a
/// destination IP.
pub fn arp_entry_offset(dest_ip: u32) -> usize {
    ARP_TABLE_BASE + ARP_ENTRY_BYTES * (dest_ip & 0xFF) as usize
}
