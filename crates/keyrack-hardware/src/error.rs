//! Error types for cabinet hardware operations.
//!
//! Read failures on a reader are routine (no tag in the field, a garbled
//! anticollision frame) and are folded into "no tag" by the scanner. The
//! remaining variants describe wiring, configuration and pin-control faults.

use keyrack_core::{PinLine, SlotNumber};

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Slot is not part of the configured cabinet.
    #[error("Unknown slot: {slot}")]
    UnknownSlot { slot: SlotNumber },

    /// Driving an output line failed.
    #[error("Failed to drive {pin}: {message}")]
    PinWrite { pin: PinLine, message: String },

    /// Bus or reader communication error.
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// No tag answered the request.
    #[error("No card in field")]
    NoCard,

    /// Anticollision frame failed its block check.
    #[error("UID checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Hardware configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new unknown slot error.
    pub fn unknown_slot(slot: SlotNumber) -> Self {
        Self::UnknownSlot { slot }
    }

    /// Create a new pin write error.
    pub fn pin_write(pin: PinLine, message: impl Into<String>) -> Self {
        Self::PinWrite {
            pin,
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<keyrack_core::Error> for HardwareError {
    fn from(error: keyrack_core::Error) -> Self {
        Self::configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_slot_error() {
        let error = HardwareError::unknown_slot(SlotNumber::new(7).unwrap());
        assert!(matches!(error, HardwareError::UnknownSlot { .. }));
        assert_eq!(error.to_string(), "Unknown slot: 7");
    }

    #[test]
    fn test_pin_write_error() {
        let error = HardwareError::pin_write(PinLine::new(17).unwrap(), "exit status 1");
        assert_eq!(error.to_string(), "Failed to drive GPIO17: exit status 1");
    }

    #[test]
    fn test_checksum_error() {
        let error = HardwareError::ChecksumMismatch {
            expected: 0x22,
            actual: 0x23,
        };
        assert_eq!(
            error.to_string(),
            "UID checksum mismatch: expected 0x22, got 0x23"
        );
    }

    #[test]
    fn test_core_error_conversion() {
        let error: HardwareError = keyrack_core::Error::Config("bad".into()).into();
        assert!(matches!(error, HardwareError::Configuration { .. }));
    }
}
