//! Key-release coordination for one cabinet.
//!
//! An unlock command opens a slot's relay and starts a verification task that
//! polls the slot's reader until the key is pulled or the window closes.
//! Meanwhile a background loop cycles over the remaining slots reporting any
//! tag presented to them. Both share the reader bus through the hardware
//! context's arbiter and agree on slot ownership through [`SlotTable`].

pub mod background;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod slot;
pub mod verification;

pub use background::{BackgroundScanner, ScanCursor, TickOutcome};
pub use coordinator::{KeyReleaseCoordinator, UnlockOutcome};
pub use error::{CoordinatorError, Result};
pub use events::EventEmitter;
pub use slot::{Slot, SlotState, SlotTable, StateTransition};
pub use verification::{Verification, VerificationOutcome};
