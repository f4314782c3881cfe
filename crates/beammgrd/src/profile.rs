//! Board profile: default register values and fabric address plan.
//!
//! A profile captures the commissioning defaults for one board: the
//! per-unit DSP parameters and the IP plan of the fabric links. The
//! built-in default mirrors the commissioning setup; a JSON file can
//! override it.

use crate::commands::Command;
use crate::error::{BeamError, BeamResult};
use mbrx_types::{BitSelect, DigitalGain, Endpoint};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

/// Address plan for one fabric link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricPlan {
    /// Link index within the unit (0..4).
    pub link: usize,
    /// The link's own endpoint; the MAC is derived from its IP.
    pub own: Endpoint,
    /// Multicast destination endpoint.
    pub dest: Endpoint,
}

/// Startup configuration for one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardProfile {
    /// Beam identifier.
    pub beam_id: u32,
    /// FFT shift schedule.
    pub fft_shift: u32,
    /// Digital gain pair.
    pub gain: DigitalGain,
    /// Accumulation length.
    pub acc_len: u32,
    /// Output bit-slice selectors.
    pub bit_select: BitSelect,
    /// Fabric links to bring up.
    pub fabric: Vec<FabricPlan>,
}

impl Default for BoardProfile {
    fn default() -> Self {
        let plan = |link: usize, own: [u8; 4], dest: [u8; 4]| FabricPlan {
            link,
            own: Endpoint::new(Ipv4Addr::from(own), 33333),
            dest: Endpoint::new(Ipv4Addr::from(dest), 12345),
        };
        BoardProfile {
            beam_id: 1,
            fft_shift: 0xFFFF,
            gain: DigitalGain::new(0x0100, 0x0100),
            acc_len: 100,
            bit_select: BitSelect::unpack(0b01010101),
            fabric: vec![
                plan(0, [192, 168, 16, 221], [239, 2, 3, 1]),
                plan(1, [192, 168, 16, 222], [239, 2, 3, 2]),
                plan(2, [192, 168, 16, 223], [239, 1, 2, 3]),
                plan(3, [192, 168, 16, 224], [239, 1, 2, 4]),
            ],
        }
    }
}

impl BoardProfile {
    /// Loads a profile from a JSON file.
    pub fn load(path: &Path) -> BeamResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BeamError::config(format!("profile {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| BeamError::config(format!("profile {}: {e}", path.display())))
    }

    /// The command sequence that applies this profile to the selected
    /// unit through the normal dispatch path.
    pub fn commands(&self) -> Vec<Command> {
        let mut commands = vec![
            Command::SetFftShift(self.fft_shift),
            Command::SetDigitalGain {
                channel: 0,
                value: self.gain.ch0,
            },
            Command::SetDigitalGain {
                channel: 1,
                value: self.gain.ch1,
            },
            Command::SetAccLen(self.acc_len),
            Command::SetBeamId(self.beam_id),
        ];
        for (index, value) in self.bit_select.fields().into_iter().enumerate() {
            commands.push(Command::SetBitSelect { index, value });
        }
        for plan in &self.fabric {
            commands.push(Command::SetDestEndpoint {
                link: plan.link,
                endpoint: plan.dest,
            });
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_matches_commissioning_setup() {
        let profile = BoardProfile::default();
        assert_eq!(profile.fft_shift, 0xFFFF);
        assert_eq!(profile.gain.pack(), 0x0100_0100);
        assert_eq!(profile.acc_len, 100);
        assert_eq!(profile.bit_select.fields(), [1, 1, 1, 1]);
        assert_eq!(profile.fabric.len(), 4);
        assert_eq!(profile.fabric[2].own.to_string(), "192.168.16.223:33333");
        assert_eq!(profile.fabric[2].dest.to_string(), "239.1.2.3:12345");
    }

    #[test]
    fn test_json_round_trip() {
        let profile = BoardProfile::default();
        let json = serde_json::to_string(&profile).unwrap();
        let back: BoardProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let profile: BoardProfile = serde_json::from_str(r#"{"acc_len": 250}"#).unwrap();
        assert_eq!(profile.acc_len, 250);
        assert_eq!(profile.fft_shift, 0xFFFF);
    }

    #[test]
    fn test_commands_cover_all_fields() {
        let profile = BoardProfile::default();
        let commands = profile.commands();
        assert!(commands.contains(&Command::SetBeamId(1)));
        assert!(commands.contains(&Command::SetAccLen(100)));
        assert!(commands
            .iter()
            .any(|c| matches!(c, Command::SetDestEndpoint { link: 3, .. })));
        // One bit-select command per field.
        assert_eq!(
            commands
                .iter()
                .filter(|c| matches!(c, Command::SetBitSelect { .. }))
                .count(),
            4
        );
    }
}
