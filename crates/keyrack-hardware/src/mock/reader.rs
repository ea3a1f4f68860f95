//! Mock tag reader for testing and development.
//!
//! The reader answers from the simulated cabinet's field, so what it sees
//! depends on which slot the bus arbiter selected and whether that slot's lock
//! is open.

use super::MockCabinet;
use crate::{HardwareError, Result, traits::TagReader, types::ReaderInfo};

/// Mock contactless reader bank.
///
/// # Examples
///
/// ```
/// use keyrack_core::{Level, MockConfig, PinLine, SlotConfig, SlotNumber};
/// use keyrack_hardware::mock::{MockCabinet, MockTagReader};
/// use keyrack_hardware::traits::TagReader;
///
/// let slot = SlotNumber::new(1).unwrap();
/// let cs = PinLine::new(4).unwrap();
/// let wiring = [SlotConfig { number: slot, chip_select: cs, relay: PinLine::new(17).unwrap() }];
/// let cabinet = MockCabinet::new(&wiring, &MockConfig::quiet());
/// let mut reader = MockTagReader::new(cabinet.clone());
///
/// cabinet.present_badge(slot, [0x04, 0xAB, 0xCD, 0xEF]);
/// cabinet.write(cs, Level::Low).unwrap();
///
/// assert!(reader.is_card_present().unwrap());
/// assert_eq!(reader.read_uid().unwrap(), vec![0x04, 0xAB, 0xCD, 0xEF]);
/// ```
#[derive(Debug, Clone)]
pub struct MockTagReader {
    cabinet: MockCabinet,
    name: String,
}

impl MockTagReader {
    /// Create a new mock reader with the default name.
    pub fn new(cabinet: MockCabinet) -> Self {
        Self::with_name(cabinet, "Mock Tag Reader")
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(cabinet: MockCabinet, name: impl Into<String>) -> Self {
        Self {
            cabinet,
            name: name.into(),
        }
    }
}

impl TagReader for MockTagReader {
    fn is_card_present(&mut self) -> Result<bool> {
        Ok(self.cabinet.field()?.is_some())
    }

    fn read_uid(&mut self) -> Result<Vec<u8>> {
        self.cabinet
            .field()?
            .map(|uid| uid.to_vec())
            .ok_or(HardwareError::NoCard)
    }

    fn reader_info(&self) -> ReaderInfo {
        ReaderInfo::new(self.name.clone(), vec!["ISO14443A".to_string()])
    }
}
