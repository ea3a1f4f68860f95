//! Core types shared by every keyrack crate.
//!
//! Slot and pin identities, tag UIDs, the messages exchanged with the remote
//! authority, and the validated cabinet configuration all live here so the
//! hardware, coordinator and network layers agree on one vocabulary.

pub mod config;
pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use config::{CabinetConfig, ChannelConfig, HardwareConfig, MockConfig, SlotConfig, TimingConfig};
pub use error::{Error, Result};
pub use messages::{InboundCommand, OutboundEvent};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
