//! Hardware capability traits.
//!
//! These traits establish the contract between the coordinator and the cabinet
//! hardware, so the real drivers and the mock cabinet are interchangeable.
//!
//! Every operation is a short synchronous call: a GPIO write or a handful of
//! SPI register transfers. Callers perform them inside the task that needs
//! them and never hold hardware across an `.await`.
//!
//! Dispatch between implementations goes through the enum wrappers in
//! [`devices`](crate::devices), chosen once at startup.

use crate::error::Result;
use crate::types::ReaderInfo;
use keyrack_core::{Level, PinLine};

/// Output-line driver.
///
/// Implementations are shared between the bus arbiter and the relay
/// controller, hence `&self` and `Sync`.
///
/// # Examples
///
/// ```
/// use keyrack_core::{Level, PinLine};
/// use keyrack_hardware::traits::PinControl;
/// use keyrack_hardware::Result;
///
/// fn pulse<P: PinControl>(pins: &P, pin: PinLine) -> Result<()> {
///     pins.write(pin, Level::High)?;
///     pins.write(pin, Level::Low)
/// }
/// ```
pub trait PinControl: Send + Sync {
    /// Configure `pin` as an output and drive it to `initial`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinWrite` if the line cannot be configured.
    fn configure_output(&self, pin: PinLine, initial: Level) -> Result<()>;

    /// Drive `pin` to `level`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinWrite` if the write did not complete.
    fn write(&self, pin: PinLine, level: Level) -> Result<()>;
}

/// Contactless tag reader on the currently selected bus slot.
///
/// # Examples
///
/// ```
/// use keyrack_hardware::traits::TagReader;
/// use keyrack_hardware::Result;
///
/// fn read_raw_uid<R: TagReader>(reader: &mut R) -> Result<Option<Vec<u8>>> {
///     if !reader.is_card_present()? {
///         return Ok(None);
///     }
///     reader.read_uid().map(Some)
/// }
/// ```
pub trait TagReader: Send {
    /// Ask whether a tag answers in the field.
    ///
    /// # Errors
    ///
    /// Returns a communication error when the reader does not respond.
    fn is_card_present(&mut self) -> Result<bool>;

    /// Read the identifier of the tag in the field.
    ///
    /// # Errors
    ///
    /// - `HardwareError::NoCard` if the tag left the field
    /// - `HardwareError::ChecksumMismatch` if the frame is corrupt
    fn read_uid(&mut self) -> Result<Vec<u8>>;

    /// Describe the reader.
    fn reader_info(&self) -> ReaderInfo;
}

/// Full-duplex SPI byte transport.
///
/// Chip selection is not part of the transport: the bus arbiter drives the
/// select lines itself.
pub trait SpiTransport: Send {
    /// Clock `tx` out while clocking the same number of bytes into `rx`.
    ///
    /// # Errors
    ///
    /// Returns a communication error if the transfer fails.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}
