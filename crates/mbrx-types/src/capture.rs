//! Raw snapshot buffer splitting and decoding.
//!
//! The diagnostic capture engine returns raw byte buffers. ADC captures
//! interleave the two input channels in 4-byte groups (even groups are
//! channel 0, odd groups channel 1); spectrum captures are big-endian
//! 32-bit words. A buffer whose length does not match the expected group
//! size is a protocol invariant violation and the sample is discarded.

use byteorder::{BigEndian, ByteOrder};

/// Bytes per per-channel sample group in an ADC capture.
pub const ADC_GROUP_BYTES: usize = 4;

/// Bytes per interleaved two-channel frame in an ADC capture.
pub const ADC_FRAME_BYTES: usize = 2 * ADC_GROUP_BYTES;

/// Errors for malformed capture buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("ADC capture length {len} is not a multiple of 8")]
    AdcMisaligned { len: usize },

    #[error("spectrum capture length {len} is not a multiple of 4")]
    SpectrumMisaligned { len: usize },
}

/// Splits an interleaved ADC capture into its two channel streams.
///
/// Groups at even positions belong to channel 0, odd positions to
/// channel 1; each channel's stream keeps the original byte order.
pub fn split_adc(raw: &[u8]) -> Result<(Vec<i8>, Vec<i8>), CaptureError> {
    if raw.len() % ADC_FRAME_BYTES != 0 {
        return Err(CaptureError::AdcMisaligned { len: raw.len() });
    }

    let samples = raw.len() / 2;
    let mut ch0 = Vec::with_capacity(samples);
    let mut ch1 = Vec::with_capacity(samples);
    for (index, group) in raw.chunks_exact(ADC_GROUP_BYTES).enumerate() {
        let channel = if index % 2 == 0 { &mut ch0 } else { &mut ch1 };
        channel.extend(group.iter().map(|&b| b as i8));
    }
    Ok((ch0, ch1))
}

/// Decodes a big-endian unsigned spectrum capture (auto-correlations).
pub fn decode_spectrum_u32(raw: &[u8]) -> Result<Vec<u32>, CaptureError> {
    if raw.len() % 4 != 0 {
        return Err(CaptureError::SpectrumMisaligned { len: raw.len() });
    }
    Ok(raw.chunks_exact(4).map(BigEndian::read_u32).collect())
}

/// Decodes a big-endian signed spectrum capture (cross-correlation parts).
pub fn decode_spectrum_i32(raw: &[u8]) -> Result<Vec<i32>, CaptureError> {
    if raw.len() % 4 != 0 {
        return Err(CaptureError::SpectrumMisaligned { len: raw.len() });
    }
    Ok(raw.chunks_exact(4).map(BigEndian::read_i32).collect())
}
