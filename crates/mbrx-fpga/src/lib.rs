//! Register access port abstraction for the mbrx control plane.
//!
//! The instrument exposes its entire configuration surface as named
//! 32-bit registers plus a few raw byte windows, reached over a remote
//! transport. This crate defines:
//!
//! - [`RegisterPort`]: the async trait every transport implements
//! - [`TransportError`]: the transport failure taxonomy
//! - [`names`]: the bit-exact register naming contract of the firmware
//! - [`SimRegisterPort`]: an in-memory register file used by tests and
//!   the daemon's `--sim` mode
//!
//! The wire protocol itself (katcp) lives outside this workspace; any
//! implementation of [`RegisterPort`] plugs in.

pub mod names;

mod error;
mod port;
mod sim;

pub use error::{PortResult, TransportError};
pub use port::{RegisterPort, Snapshot, SnapshotOptions};
pub use sim::{PortOp, SimRegisterPort};
