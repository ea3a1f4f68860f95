//! Hardware layer of the key cabinet.
//!
//! A bank of MFRC522 tag readers shares one SPI bus, each reader enabled by
//! its own GPIO select line, and every slot has a solenoid lock on a relay
//! line. This crate owns that wiring:
//!
//! - [`detect`] probes the host and picks real or mock drivers;
//! - [`BusArbiter`] guarantees that at most one select line is asserted;
//! - [`scan_once`] reads one tag on the selected slot;
//! - [`RelayController`] opens and closes locks;
//! - [`HardwareContext`] bundles all of the above for the coordinator.
//!
//! # Capability traits
//!
//! [`PinControl`], [`TagReader`] and [`SpiTransport`] are implemented by the
//! real drivers (`pinctrl`, MFRC522 over spidev) and by the mock cabinet. The
//! enum wrappers in [`devices`] dispatch between them.
//!
//! ```
//! use keyrack_core::{CabinetConfig, SlotNumber};
//! use keyrack_hardware::{HardwareContext, scan_once};
//!
//! let (context, cabinet) = HardwareContext::mock(&CabinetConfig::default());
//! context.initialize().unwrap();
//!
//! let slot = SlotNumber::new(2).unwrap();
//! cabinet.present_badge(slot, [0xDE, 0xAD, 0xBE, 0xEF]);
//!
//! let mut access = context.bus().activate(slot).unwrap();
//! assert_eq!(scan_once(&mut access).unwrap().as_str(), "DEADBEEF");
//! ```
//!
//! # Features
//!
//! - `hardware-spi`: the spidev transport. Without it the crate still builds
//!   and runs, always in mock mode.
//!
//! [`detect`]: detect::detect
//! [`PinControl`]: traits::PinControl
//! [`TagReader`]: traits::TagReader
//! [`SpiTransport`]: traits::SpiTransport

pub mod bus;
pub mod context;
pub mod detect;
pub mod devices;
pub mod error;
pub mod mfrc522;
pub mod mock;
pub mod pins;
pub mod relay;
pub mod scanner;
#[cfg(feature = "hardware-spi")]
pub mod spi;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use bus::{BusArbiter, ScopedBusAccess};
pub use context::HardwareContext;
pub use detect::{Detection, detect};
pub use error::{HardwareError, Result};
pub use relay::RelayController;
pub use scanner::scan_once;
pub use types::{PinRole, ReaderInfo};
