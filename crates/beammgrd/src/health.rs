//! Reference-clock health validation.
//!
//! The firmware exposes a free-running 32-bit counter on the FPGA
//! clock. Sampling it across poll cycles gives an estimate of the
//! actual clock rate; a rate far from nominal means the reference
//! clock source is missing or wrong. Purely diagnostic: the result
//! never gates any control-plane operation.

use std::time::Instant;
use tracing::{debug, error};

/// Nominal FPGA clock frequency.
pub const FPGA_CLOCK_HZ: f64 = 250e6;

/// Accepted deviation from nominal before the clock is flagged.
pub const CLOCK_TOLERANCE: f64 = 0.10;

/// Result of one clock-rate observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockHealth {
    /// Estimated rate within tolerance of nominal.
    Ok {
        /// Estimated clock rate in Hz.
        hz: f64,
    },
    /// Estimated rate outside tolerance; check the clock source.
    OutOfSpec {
        /// Estimated clock rate in Hz.
        hz: f64,
    },
}

impl ClockHealth {
    /// True when the clock is within tolerance.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ClockHealth::Ok { .. })
    }

    /// The estimated clock rate in Hz.
    pub fn hz(&self) -> f64 {
        match *self {
            ClockHealth::Ok { hz } | ClockHealth::OutOfSpec { hz } => hz,
        }
    }
}

/// Elapsed counter ticks between two readings, accounting for 32-bit
/// wraparound.
pub fn elapsed_ticks(previous: u32, current: u32) -> u64 {
    current.wrapping_sub(previous) as u64
}

/// Stateful clock-rate validator fed one counter reading per published
/// sample.
pub struct ClockValidator {
    nominal_hz: f64,
    tolerance: f64,
    last: Option<(u32, Instant)>,
}

impl ClockValidator {
    /// Creates a validator with the default tolerance.
    pub fn new(nominal_hz: f64) -> Self {
        ClockValidator {
            nominal_hz,
            tolerance: CLOCK_TOLERANCE,
            last: None,
        }
    }

    /// Feeds one counter reading taken now. Returns `None` until a
    /// baseline reading exists.
    pub fn observe(&mut self, count: u32) -> Option<ClockHealth> {
        self.observe_at(count, Instant::now())
    }

    fn observe_at(&mut self, count: u32, at: Instant) -> Option<ClockHealth> {
        let previous = self.last.replace((count, at));
        let (prev_count, prev_time) = previous?;

        let dt = at.duration_since(prev_time).as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        let hz = elapsed_ticks(prev_count, count) as f64 / dt;
        Some(self.classify(hz))
    }

    fn classify(&self, hz: f64) -> ClockHealth {
        let low = self.nominal_hz * (1.0 - self.tolerance);
        let high = self.nominal_hz * (1.0 + self.tolerance);
        if hz < low || hz > high {
            error!(
                "invalid FPGA clock: {:.3} MHz, check clock source",
                hz * 1e-6
            );
            ClockHealth::OutOfSpec { hz }
        } else {
            debug!("estimated FPGA clock {:.3} MHz", hz * 1e-6);
            ClockHealth::Ok { hz }
        }
    }
}
