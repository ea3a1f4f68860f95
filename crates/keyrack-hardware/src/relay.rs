//! Per-slot lock relays.
//!
//! Energizing a relay (line high) opens the slot's solenoid lock. There is no
//! feedback from the lock itself: `unlock` reports whether the line was
//! driven, nothing more.

use std::collections::BTreeMap;
use std::sync::Arc;

use keyrack_core::{Level, PinLine, SlotConfig, SlotNumber};
use tracing::{debug, error, info, warn};

use crate::devices::AnyPinControl;
use crate::error::Result;
use crate::traits::PinControl;

/// Driver for every slot's lock relay.
#[derive(Debug)]
pub struct RelayController {
    relay_lines: BTreeMap<SlotNumber, PinLine>,
    pins: Arc<AnyPinControl>,
}

impl RelayController {
    pub fn new(slots: &[SlotConfig], pins: Arc<AnyPinControl>) -> Self {
        let relay_lines = slots
            .iter()
            .map(|slot| (slot.number, slot.relay))
            .collect();
        Self { relay_lines, pins }
    }

    /// Configure every relay line as an output, locked.
    ///
    /// # Errors
    ///
    /// Returns the first `HardwareError::PinWrite` encountered.
    pub fn initialize(&self) -> Result<()> {
        for (slot, pin) in &self.relay_lines {
            debug!(%slot, %pin, "relay locked");
            self.pins.configure_output(*pin, Level::DE_ENERGIZED)?;
        }
        Ok(())
    }

    /// Open the lock of `slot`.
    ///
    /// Returns `true` once the relay line was driven high; `false` for an
    /// unknown slot or a failed write.
    pub fn unlock(&self, slot: SlotNumber) -> bool {
        let Some(pin) = self.relay_lines.get(&slot).copied() else {
            warn!(%slot, "unlock requested for unknown slot");
            return false;
        };
        match self.pins.write(pin, Level::ENERGIZED) {
            Ok(()) => {
                info!(%slot, %pin, "slot unlocked");
                true
            }
            Err(e) => {
                error!(%slot, %pin, error = %e, "failed to unlock slot");
                false
            }
        }
    }

    /// Close the lock of `slot`, best effort.
    ///
    /// Failures are logged and swallowed; an unknown slot is ignored.
    pub fn lock(&self, slot: SlotNumber) {
        let Some(pin) = self.relay_lines.get(&slot).copied() else {
            warn!(%slot, "lock requested for unknown slot");
            return;
        };
        match self.pins.write(pin, Level::DE_ENERGIZED) {
            Ok(()) => info!(%slot, %pin, "slot locked"),
            Err(e) => error!(%slot, %pin, error = %e, "failed to lock slot"),
        }
    }

    /// Close every lock, best effort.
    pub fn lock_all(&self) {
        for slot in self.relay_lines.keys() {
            self.lock(*slot);
        }
    }

    #[must_use]
    pub fn contains(&self, slot: SlotNumber) -> bool {
        self.relay_lines.contains_key(&slot)
    }
}
