//! Chip-select bus arbiter.
//!
//! All readers share one SPI bus and are told apart only by their select
//! lines, so at most one line may be asserted at any instant. The arbiter is
//! the only path to the bus: [`BusArbiter::activate`] takes the bus lock,
//! asserts the slot's line, and hands out a [`ScopedBusAccess`] that
//! deasserts the line when it goes away, whatever the exit path.
//!
//! The guard holds a `std::sync::MutexGuard`, which is not `Send`; a task
//! therefore cannot keep the bus across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keyrack_core::{Level, PinLine, SlotConfig, SlotNumber};
use tracing::{error, trace, warn};

use crate::devices::{AnyPinControl, AnyTagReader};
use crate::error::{HardwareError, Result};
use crate::traits::PinControl;

#[derive(Debug)]
struct BusState {
    reader: AnyTagReader,
    active: Option<SlotNumber>,
}

/// Owner of the shared reader bus.
#[derive(Debug)]
pub struct BusArbiter {
    select_lines: BTreeMap<SlotNumber, PinLine>,
    pins: Arc<AnyPinControl>,
    state: Mutex<BusState>,
}

impl BusArbiter {
    /// Build an arbiter over the select lines of `slots`.
    pub fn new(slots: &[SlotConfig], pins: Arc<AnyPinControl>, reader: AnyTagReader) -> Self {
        let select_lines = slots
            .iter()
            .map(|slot| (slot.number, slot.chip_select))
            .collect();
        Self {
            select_lines,
            pins,
            state: Mutex::new(BusState {
                reader,
                active: None,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configure every select line as an output, deasserted.
    ///
    /// # Errors
    ///
    /// Returns the first `HardwareError::PinWrite` encountered.
    pub fn initialize(&self) -> Result<()> {
        let _state = self.lock_state();
        for (slot, pin) in &self.select_lines {
            trace!(%slot, %pin, "select line inactive");
            self.pins.configure_output(*pin, Level::DESELECTED)?;
        }
        Ok(())
    }

    /// Select `slot`'s reader for exclusive use.
    ///
    /// Blocks while another slot holds the bus.
    ///
    /// # Errors
    ///
    /// - `HardwareError::UnknownSlot` if the slot is not configured; no line
    ///   is touched
    /// - `HardwareError::PinWrite` if the line could not be asserted; it is
    ///   driven back inactive on a best-effort basis
    pub fn activate(&self, slot: SlotNumber) -> Result<ScopedBusAccess<'_>> {
        let pin = *self
            .select_lines
            .get(&slot)
            .ok_or_else(|| HardwareError::unknown_slot(slot))?;

        let mut state = self.lock_state();
        debug_assert!(
            state.active.is_none(),
            "slot {:?} still active while activating {slot}",
            state.active
        );

        if let Err(e) = self.pins.write(pin, Level::SELECTED) {
            warn!(%slot, %pin, error = %e, "failed to assert select line");
            if let Err(e) = self.pins.write(pin, Level::DESELECTED) {
                error!(%slot, %pin, error = %e, "failed to deassert select line");
            }
            return Err(e);
        }

        state.active = Some(slot);
        trace!(%slot, %pin, "bus activated");
        Ok(ScopedBusAccess {
            pins: &self.pins,
            state,
            slot,
            pin,
            released: false,
        })
    }

    /// Slot currently holding the bus, if any.
    ///
    /// Blocks while a scope is open, so it only ever observes `None` from
    /// outside a scope; useful in tests asserting that scopes were closed.
    #[must_use]
    pub fn active(&self) -> Option<SlotNumber> {
        self.lock_state().active
    }

    /// Configured slots, ascending.
    pub fn slots(&self) -> impl Iterator<Item = SlotNumber> + '_ {
        self.select_lines.keys().copied()
    }
}

/// Exclusive access to one slot's reader.
///
/// Dropping the scope deasserts the select line unconditionally.
#[derive(Debug)]
pub struct ScopedBusAccess<'a> {
    pins: &'a AnyPinControl,
    state: MutexGuard<'a, BusState>,
    slot: SlotNumber,
    pin: PinLine,
    released: bool,
}

impl ScopedBusAccess<'_> {
    #[must_use]
    pub fn slot(&self) -> SlotNumber {
        self.slot
    }

    /// Reader on the selected slot.
    pub fn reader(&mut self) -> &mut AnyTagReader {
        &mut self.state.reader
    }

    /// Deassert the select line and give the bus back.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinWrite` if the line could not be deasserted.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.deassert()
    }

    fn deassert(&mut self) -> Result<()> {
        self.state.active = None;
        let result = self.pins.write(self.pin, Level::DESELECTED);
        trace!(slot = %self.slot, pin = %self.pin, "bus released");
        result
    }
}

impl Drop for ScopedBusAccess<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.deassert() {
            error!(slot = %self.slot, pin = %self.pin, error = %e, "failed to deassert select line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCabinet, MockPins, MockTagReader};
    use keyrack_core::{CabinetConfig, MockConfig};

    fn arbiter() -> (BusArbiter, MockCabinet) {
        let config = CabinetConfig::default();
        let cabinet = MockCabinet::new(&config.slots, &MockConfig::quiet());
        let pins = Arc::new(AnyPinControl::Mock(MockPins::new(cabinet.clone())));
        let reader = AnyTagReader::Mock(MockTagReader::new(cabinet.clone()));
        (BusArbiter::new(&config.slots, pins, reader), cabinet)
    }

    fn slot(n: u8) -> SlotNumber {
        SlotNumber::new(n).unwrap()
    }

    #[test]
    fn test_initialize_deasserts_all_lines() {
        let (bus, cabinet) = arbiter();
        bus.initialize().unwrap();
        for pin in [4, 5, 6, 12, 13, 16, 19, 20, 21, 26] {
            assert_eq!(cabinet.level(PinLine::new(pin).unwrap()), Some(Level::High));
        }
        assert!(cabinet.selected().is_empty());
    }

    #[test]
    fn test_activate_asserts_and_drop_deasserts() {
        let (bus, cabinet) = arbiter();
        let cs = PinLine::new(6).unwrap();
        {
            let access = bus.activate(slot(3)).unwrap();
            assert_eq!(access.slot(), slot(3));
            assert_eq!(cabinet.level(cs), Some(Level::Low));
            assert_eq!(cabinet.selected(), vec![slot(3)]);
        }
        assert_eq!(cabinet.level(cs), Some(Level::High));
        assert!(cabinet.selected().is_empty());
        assert_eq!(bus.active(), None);
    }

    #[test]
    fn test_release_is_explicit_close() {
        let (bus, cabinet) = arbiter();
        let access = bus.activate(slot(1)).unwrap();
        access.release().unwrap();
        assert_eq!(cabinet.level(PinLine::new(4).unwrap()), Some(Level::High));
        assert!(cabinet.relay_writes(slot(1)).is_empty());
    }

    #[test]
    fn test_unknown_slot_touches_nothing() {
        let config = CabinetConfig::from_toml_str(
            "[[slots]]\nnumber = 1\nchip_select = 4\nrelay = 17",
        )
        .unwrap();
        let cabinet = MockCabinet::new(&config.slots, &MockConfig::quiet());
        let pins = Arc::new(AnyPinControl::Mock(MockPins::new(cabinet.clone())));
        let reader = AnyTagReader::Mock(MockTagReader::new(cabinet.clone()));
        let bus = BusArbiter::new(&config.slots, pins, reader);

        let result = bus.activate(slot(2));
        assert!(matches!(result, Err(HardwareError::UnknownSlot { .. })));
        assert_eq!(cabinet.selections(slot(2)), 0);
        assert_eq!(cabinet.level(PinLine::new(5).unwrap()), None);
    }

    #[test]
    fn test_failed_assert_is_reported() {
        let (bus, cabinet) = arbiter();
        cabinet.fail_pin(PinLine::new(4).unwrap());
        assert!(matches!(
            bus.activate(slot(1)),
            Err(HardwareError::PinWrite { .. })
        ));
        cabinet.restore_pin(PinLine::new(4).unwrap());
        assert!(bus.activate(slot(1)).is_ok());
    }

    #[test]
    fn test_scope_released_on_early_return() {
        fn scan_then_bail(bus: &BusArbiter) -> Result<()> {
            let _access = bus.activate(SlotNumber::new(2).unwrap())?;
            Err(HardwareError::NoCard)
        }

        let (bus, cabinet) = arbiter();
        assert!(scan_then_bail(&bus).is_err());
        assert!(cabinet.selected().is_empty());
        assert_eq!(cabinet.max_selected(), 1);
    }

    #[test]
    fn test_sequential_scopes_never_overlap() {
        let (bus, cabinet) = arbiter();
        for n in 1..=10 {
            let access = bus.activate(slot(n)).unwrap();
            drop(access);
        }
        assert_eq!(cabinet.max_selected(), 1);
    }

    #[test]
    fn test_threads_share_bus_exclusively() {
        let (bus, cabinet) = arbiter();
        let bus = Arc::new(bus);
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _access = bus.activate(SlotNumber::new(n).unwrap()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cabinet.max_selected(), 1);
    }
}
