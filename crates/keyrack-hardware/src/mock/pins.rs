//! Mock pin controller.

use keyrack_core::{Level, PinLine};

use super::MockCabinet;
use crate::error::Result;
use crate::traits::PinControl;

/// Pin controller that records writes into a [`MockCabinet`].
#[derive(Debug, Clone)]
pub struct MockPins {
    cabinet: MockCabinet,
}

impl MockPins {
    pub fn new(cabinet: MockCabinet) -> Self {
        Self { cabinet }
    }
}

impl PinControl for MockPins {
    fn configure_output(&self, pin: PinLine, initial: Level) -> Result<()> {
        self.cabinet.write(pin, initial)
    }

    fn write(&self, pin: PinLine, level: Level) -> Result<()> {
        self.cabinet.write(pin, level)
    }
}
