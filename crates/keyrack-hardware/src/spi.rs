//! Linux spidev transport for the reader bank.
//!
//! The device is opened with `SPI_NO_CS`: readers are selected through the
//! per-slot GPIO lines, not the controller's own chip-select.

use std::path::Path;

use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use tracing::info;

use crate::error::{HardwareError, Result};
use crate::traits::SpiTransport;

/// SPI transport over `/dev/spidevB.C`.
pub struct SpidevTransport {
    device: Spidev,
}

impl std::fmt::Debug for SpidevTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpidevTransport").finish_non_exhaustive()
    }
}

impl SpidevTransport {
    /// Open and configure the device node.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if the node cannot be
    /// opened or configured.
    pub fn open(path: &Path, speed_hz: u32) -> Result<Self> {
        let mut device = Spidev::open(path).map_err(|e| {
            HardwareError::initialization_failed(format!("{}: {e}", path.display()))
        })?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS)
            .build();
        device.configure(&options).map_err(|e| {
            HardwareError::initialization_failed(format!("{}: {e}", path.display()))
        })?;

        info!(device = %path.display(), speed_hz, "SPI bus opened");
        Ok(Self { device })
    }
}

impl SpiTransport for SpidevTransport {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let mut transfer = SpidevTransfer::read_write(tx, rx);
        self.device
            .transfer(&mut transfer)
            .map_err(|e| HardwareError::communication(e.to_string()))
    }
}
