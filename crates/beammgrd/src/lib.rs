//! # beammgrd - Multi-Beam Receiver Control Daemon
//!
//! Control plane for a multi-beam digital-receiver FPGA instrument.
//! The daemon mirrors device configuration, programs the signal path
//! and the network-fabric outputs, and continuously samples diagnostic
//! snapshots for live monitoring.
//!
//! ## Responsibilities
//! - Configuration state store with delta-driven register writes
//! - Fabric link bring-up (tap start, destination programming, ARP
//!   workaround)
//! - Snapshot arbitration over the shared scratchpad register
//! - Background snapshot polling with stop-and-join cancellation
//! - Reference-clock health validation
//!
//! ## Structure
//! All device traffic flows through the [`mbrx_fpga::RegisterPort`]
//! trait; the session ([`session::DeviceSession`]) is the explicit
//! lifecycle context, and every control operation is a
//! [`commands::Command`] routed through one [`commands::Dispatcher`].

pub mod arbiter;
pub mod commands;
pub mod error;
pub mod fabric;
pub mod health;
pub mod poller;
pub mod profile;
pub mod session;
pub mod snapshot;
pub mod store;

pub use arbiter::{ArbState, ArbiterConfig, ScopeArbiter, ScopeToken};
pub use commands::{Command, Dispatcher};
pub use error::{BeamError, BeamResult};
pub use health::{ClockHealth, ClockValidator, FPGA_CLOCK_HZ};
pub use poller::{PollContext, PollerConfig, SampleUpdate, SnapshotPoller};
pub use profile::{BoardProfile, FabricPlan};
pub use session::{DeviceSession, FirmwareInfo};
pub use snapshot::{SnapshotSample, Spectrum};
pub use store::{BoardConfig, ConfigStore, UnitConfig};
