//! Signal-processing unit selection.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two independent signal-processing pipelines on the board.
///
/// Per-unit registers resolve through the unit's name prefix
/// (`u0_fft_shift`, `u1_acc_len`, ...); shared edge-triggered control
/// registers address a unit through its bit (`1 << index`); fabric link
/// registers are numbered `link + 4 * index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Unit {
    #[default]
    Unit0,
    Unit1,
}

impl Unit {
    /// Both units, in index order.
    pub const ALL: [Unit; 2] = [Unit::Unit0, Unit::Unit1];

    /// Numeric index of the unit (0 or 1).
    pub const fn index(self) -> u32 {
        match self {
            Unit::Unit0 => 0,
            Unit::Unit1 => 1,
        }
    }

    /// Bit mask addressing this unit in shared control registers.
    pub const fn bit(self) -> u32 {
        1 << self.index()
    }

    /// Register name prefix for per-unit fields.
    pub const fn prefix(self) -> &'static str {
        match self {
            Unit::Unit0 => "u0_",
            Unit::Unit1 => "u1_",
        }
    }

    /// Global fabric link number for this unit's local link index.
    pub const fn fabric_index(self, link: usize) -> usize {
        link + 4 * self.index() as usize
    }

    /// Looks up a unit by its numeric index.
    pub const fn from_index(index: u8) -> Option<Unit> {
        match index {
            0 => Some(Unit::Unit0),
            1 => Some(Unit::Unit1),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.index())
    }
}

impl TryFrom<u8> for Unit {
    type Error = ParseError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Unit::from_index(index).ok_or(ParseError::InvalidUnit(index))
    }
}

impl From<Unit> for u8 {
    fn from(unit: Unit) -> u8 {
        unit.index() as u8
    }
}
