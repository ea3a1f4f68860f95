//! Error types for the coordinator.

use keyrack_core::SlotNumber;
use keyrack_hardware::HardwareError;
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The slot already has an unlock or verification in flight.
    #[error("Slot {slot} already has a pending verification")]
    AlreadyPending { slot: SlotNumber },

    /// The slot is not part of the configured cabinet.
    #[error("Unknown slot: {slot}")]
    UnknownSlot { slot: SlotNumber },

    #[error("Invalid state transition for slot {slot}: {from} -> {to}")]
    InvalidStateTransition {
        slot: SlotNumber,
        from: String,
        to: String,
    },

    /// The coordinator is shutting down and accepts no new work.
    #[error("Coordinator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Core(#[from] keyrack_core::Error),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}
