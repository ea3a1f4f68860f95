//! Common types shared across hardware implementations.

use keyrack_core::SlotNumber;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag reader information.
///
/// Contains reader-specific metadata such as supported protocols
/// and SPI clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "MFRC522").
    pub name: String,

    /// List of supported protocols (e.g., ["ISO14443A"]).
    pub protocols: Vec<String>,

    /// Bus clock in Hz, when the reader sits on a real bus.
    pub bus_speed_hz: Option<u32>,
}

impl ReaderInfo {
    /// Create a new ReaderInfo.
    pub fn new(name: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            protocols,
            bus_speed_hz: None,
        }
    }

    /// Set the bus clock.
    pub fn with_bus_speed_hz(mut self, hz: u32) -> Self {
        self.bus_speed_hz = Some(hz);
        self
    }
}

/// What a GPIO line is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinRole {
    /// Reader select line of a slot (active-low).
    ChipSelect(SlotNumber),

    /// Lock relay of a slot (energized high).
    Relay(SlotNumber),
}

impl PinRole {
    #[must_use]
    pub fn slot(&self) -> SlotNumber {
        match self {
            Self::ChipSelect(slot) | Self::Relay(slot) => *slot,
        }
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChipSelect(slot) => write!(f, "chip-select of slot {slot}"),
            Self::Relay(slot) => write!(f, "relay of slot {slot}"),
        }
    }
}
