//! Common types for the mbrx digital-receiver control plane.
//!
//! This crate provides type-safe representations of the values that cross
//! the register interface of the instrument:
//!
//! - [`Unit`]: one of the two signal-processing pipelines on the board
//! - [`Endpoint`]: an IPv4 address/port pair in `ip:port` form
//! - [`MacAddress`]: 48-bit Ethernet MAC, derivable from a fabric IP
//! - [`DigitalGain`]: per-channel gain pair packed into one register word
//! - [`BitSelect`]: four 2-bit output-slice selectors packed into one byte
//! - [`uint48`]: 48-bit counter values split across two 32-bit registers
//! - [`capture`]: raw snapshot buffer splitting and big-endian decoding

mod bitsel;
mod endpoint;
mod gain;
mod mac;
mod unit;

pub mod capture;
pub mod uint48;

pub use bitsel::BitSelect;
pub use capture::CaptureError;
pub use endpoint::Endpoint;
pub use gain::DigitalGain;
pub use mac::{MacAddress, FABRIC_MAC_BASE};
pub use unit::Unit;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid endpoint format: {0} (expected ip:port)")]
    InvalidEndpoint(String),

    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid unit index: {0} (must be 0 or 1)")]
    InvalidUnit(u8),
}

/// Common error type for values that exceed their register's bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("value {value} exceeds 48-bit register range")]
    Uint48 { value: u64 },

    #[error("high word {hi:#x} exceeds the 16 bits available to a 48-bit value")]
    Uint48Hi { hi: u32 },

    #[error("bit-select field {index} value {value} exceeds 2 bits")]
    BitSelectField { index: usize, value: u8 },
}
