//! 48-bit counter values split across two 32-bit registers.
//!
//! The noise-calibration counters are 48 bits wide on the device, exposed
//! as a low word (`<name>`) and a high word (`<name>_hipart`). Values that
//! do not fit in 48 bits are a reportable range error, never truncated.

use crate::RangeError;

/// Largest value representable in a 48-bit register pair.
pub const UINT48_MAX: u64 = (1 << 48) - 1;

/// Splits a 48-bit value into its low and high register words.
pub fn split(value: u64) -> Result<(u32, u32), RangeError> {
    if value > UINT48_MAX {
        return Err(RangeError::Uint48 { value });
    }
    Ok((value as u32, (value >> 32) as u32))
}

/// Joins low and high register words back into a 48-bit value.
///
/// The high word may only carry 16 significant bits; anything above that
/// means the register pair holds a corrupt or foreign value.
pub fn join(lo: u32, hi: u32) -> Result<u64, RangeError> {
    if hi > 0xFFFF {
        return Err(RangeError::Uint48Hi { hi });
    }
    Ok((hi as u64) << 32 | lo as u64)
}
