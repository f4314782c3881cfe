//! Diagnostic snapshot capture and decoding.
//!
//! One sample per poll cycle: the ADC scope of the selected unit split
//! into its two channels, plus the four accumulator scopes (AA and BB
//! auto-correlations, CR/CI cross-correlation parts). The caller is
//! responsible for holding the capture scope (see
//! [`crate::arbiter::ScopeArbiter`]) while this sequence runs.

use crate::error::BeamResult;
use chrono::{DateTime, Utc};
use mbrx_fpga::names;
use mbrx_fpga::{RegisterPort, SnapshotOptions};
use mbrx_types::{capture, Unit};

/// One decoded spectrum buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spectrum {
    /// Unsigned auto-correlation power (AA, BB).
    Auto(Vec<u32>),
    /// Signed cross-correlation part (CR, CI).
    Cross(Vec<i32>),
}

impl Spectrum {
    /// Number of spectral bins in the buffer.
    pub fn len(&self) -> usize {
        match self {
            Spectrum::Auto(bins) => bins.len(),
            Spectrum::Cross(bins) => bins.len(),
        }
    }

    /// True when the buffer holds no bins.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded snapshot of the selected unit, immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSample {
    /// The unit the sample was captured from.
    pub unit: Unit,
    /// ADC sample streams for the two input channels.
    pub adc: (Vec<i8>, Vec<i8>),
    /// Spectrum buffers in AA, BB, CR, CI order.
    pub spectra: [Spectrum; 4],
    /// Capture wall-clock time.
    pub captured_at: DateTime<Utc>,
}

async fn fetch(port: &dyn RegisterPort, name: &str, options: SnapshotOptions) -> BeamResult<Vec<u8>> {
    let snap = port.trigger_snapshot(name, options).await?;
    let mut data = snap.data;
    data.truncate(snap.length);
    Ok(data)
}

/// Captures and decodes one sample for a unit.
pub async fn capture_sample(port: &dyn RegisterPort, unit: Unit) -> BeamResult<SnapshotSample> {
    let raw = fetch(port, &names::adc_scope(unit), SnapshotOptions::triggered()).await?;
    let adc = capture::split_adc(&raw)?;

    let aa = fetch(port, &names::spectrum_scope(unit, "AA"), SnapshotOptions::free_running()).await?;
    let bb = fetch(port, &names::spectrum_scope(unit, "BB"), SnapshotOptions::free_running()).await?;
    let cr = fetch(port, &names::spectrum_scope(unit, "CR"), SnapshotOptions::free_running()).await?;
    let ci = fetch(port, &names::spectrum_scope(unit, "CI"), SnapshotOptions::free_running()).await?;

    Ok(SnapshotSample {
        unit,
        adc,
        spectra: [
            Spectrum::Auto(capture::decode_spectrum_u32(&aa)?),
            Spectrum::Auto(capture::decode_spectrum_u32(&bb)?),
            Spectrum::Cross(capture::decode_spectrum_i32(&cr)?),
            Spectrum::Cross(capture::decode_spectrum_i32(&ci)?),
        ],
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrx_fpga::SimRegisterPort;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn seed_scopes(port: &SimRegisterPort, unit: Unit) {
        port.load_snapshot(&names::adc_scope(unit), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        for channel in names::SPECTRUM_SCOPES {
            port.load_snapshot(
                &names::spectrum_scope(unit, channel),
                vec![0x00, 0x00, 0x00, 0x02, 0xFF, 0xFF, 0xFF, 0xFE],
            );
        }
    }

    #[tokio::test]
    async fn test_capture_decodes_all_scopes() {
        let port = Arc::new(SimRegisterPort::new());
        seed_scopes(&port, Unit::Unit1);

        let sample = capture_sample(port.as_ref(), Unit::Unit1).await.unwrap();
        assert_eq!(sample.unit, Unit::Unit1);
        assert_eq!(sample.adc.0, vec![1, 2, 3, 4]);
        assert_eq!(sample.adc.1, vec![5, 6, 7, 8]);
        assert_eq!(sample.spectra[0], Spectrum::Auto(vec![2, 0xFFFF_FFFE]));
        assert_eq!(sample.spectra[3], Spectrum::Cross(vec![2, -2]));
    }

    #[tokio::test]
    async fn test_misaligned_adc_capture_discards_sample() {
        let port = Arc::new(SimRegisterPort::new());
        seed_scopes(&port, Unit::Unit0);
        port.load_snapshot(&names::adc_scope(Unit::Unit0), vec![0; 10]);

        assert!(capture_sample(port.as_ref(), Unit::Unit0).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_scope_is_transport_error() {
        let port = Arc::new(SimRegisterPort::new());
        assert!(capture_sample(port.as_ref(), Unit::Unit0).await.is_err());
    }
}
