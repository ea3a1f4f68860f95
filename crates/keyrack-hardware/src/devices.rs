//! Enum wrappers for hardware dispatch.
//!
//! The driver family is chosen once at startup, so a closed enum per
//! capability gives concrete dispatch without trait objects, and lets
//! feature-gated variants disappear from builds that lack them.
//!
//! # Examples
//!
//! ```
//! use keyrack_core::{CabinetConfig, MockConfig};
//! use keyrack_hardware::devices::{AnyPinControl, AnyTagReader};
//! use keyrack_hardware::mock::{MockCabinet, MockPins, MockTagReader};
//!
//! let config = CabinetConfig::default();
//! let cabinet = MockCabinet::new(&config.slots, &MockConfig::quiet());
//! let pins = AnyPinControl::Mock(MockPins::new(cabinet.clone()));
//! let reader = AnyTagReader::Mock(MockTagReader::new(cabinet));
//! ```

use keyrack_core::{Level, PinLine};

use crate::mfrc522::Mfrc522;
use crate::mock::{MockPins, MockTagReader, SimulatedChip};
use crate::pins::PinctrlPins;
#[cfg(feature = "hardware-spi")]
use crate::spi::SpidevTransport;
use crate::traits::{PinControl, SpiTransport, TagReader};
use crate::{ReaderInfo, Result};

/// Enum wrapper for output-line drivers.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyPinControl {
    /// `pinctrl` on a Raspberry Pi.
    Pinctrl(PinctrlPins),
    /// Writes recorded by the mock cabinet.
    Mock(MockPins),
}

impl PinControl for AnyPinControl {
    fn configure_output(&self, pin: PinLine, initial: Level) -> Result<()> {
        match self {
            Self::Pinctrl(pins) => pins.configure_output(pin, initial),
            Self::Mock(pins) => pins.configure_output(pin, initial),
        }
    }

    fn write(&self, pin: PinLine, level: Level) -> Result<()> {
        match self {
            Self::Pinctrl(pins) => pins.write(pin, level),
            Self::Mock(pins) => pins.write(pin, level),
        }
    }
}

/// Enum wrapper for SPI transports.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnySpiTransport {
    /// Linux spidev node.
    #[cfg(feature = "hardware-spi")]
    Spidev(SpidevTransport),
    /// Simulated MFRC522 bank.
    Simulated(SimulatedChip),
}

impl SpiTransport for AnySpiTransport {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-spi")]
            Self::Spidev(spi) => spi.transfer(tx, rx),
            Self::Simulated(chip) => chip.transfer(tx, rx),
        }
    }
}

/// Enum wrapper for tag readers.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTagReader {
    /// Mock reader answering straight from the cabinet.
    Mock(MockTagReader),
    /// MFRC522 protocol driver.
    Mfrc522(Mfrc522<AnySpiTransport>),
}

impl TagReader for AnyTagReader {
    fn is_card_present(&mut self) -> Result<bool> {
        match self {
            Self::Mock(reader) => reader.is_card_present(),
            Self::Mfrc522(reader) => reader.is_card_present(),
        }
    }

    fn read_uid(&mut self) -> Result<Vec<u8>> {
        match self {
            Self::Mock(reader) => reader.read_uid(),
            Self::Mfrc522(reader) => reader.read_uid(),
        }
    }

    fn reader_info(&self) -> ReaderInfo {
        match self {
            Self::Mock(reader) => reader.reader_info(),
            Self::Mfrc522(reader) => reader.reader_info(),
        }
    }
}
