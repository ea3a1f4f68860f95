//! Simulated cabinet shared by every mock device.
//!
//! The cabinet sees every pin write, so it knows which reader is selected and
//! which relays are energized. From that it decides what a reader finds in its
//! field:
//!
//! - the field is decided once per selection, when a select line goes low;
//! - while a slot's relay is energized its key tag stays in the field for a
//!   configured number of selections and is then gone (the user pulled it);
//! - otherwise a scripted badge, or with some probability a random one.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keyrack_core::{Level, MockConfig, PinLine, SlotConfig, SlotNumber, Uid};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{HardwareError, Result};
use crate::types::PinRole;

/// Key tag state while a slot's lock is open.
#[derive(Debug, Clone, Copy)]
struct KeyWindow {
    reads: u32,
    pull_after: Option<u32>,
}

#[derive(Debug)]
struct CabinetState {
    roles: HashMap<PinLine, PinRole>,
    levels: HashMap<PinLine, Level>,
    selected: BTreeSet<SlotNumber>,
    max_selected: usize,
    selections: HashMap<SlotNumber, u64>,
    relay_writes: HashMap<SlotNumber, Vec<Level>>,
    failing: HashSet<PinLine>,
    windows: HashMap<SlotNumber, KeyWindow>,
    pull_overrides: HashMap<SlotNumber, Option<u32>>,
    badges: HashMap<SlotNumber, VecDeque<[u8; 4]>>,
    field: Option<(SlotNumber, Option<[u8; 4]>)>,
    pull_after: Option<u32>,
    badge_probability: f64,
    rng: StdRng,
}

impl CabinetState {
    fn decide_field(&mut self, slot: SlotNumber) -> Option<[u8; 4]> {
        if let Some(window) = self.windows.get_mut(&slot) {
            window.reads += 1;
            let present = match window.pull_after {
                None => true,
                Some(limit) => window.reads <= limit,
            };
            return present.then(|| key_tag_bytes(slot));
        }

        if let Some(badge) = self.badges.get_mut(&slot).and_then(VecDeque::pop_front) {
            return Some(badge);
        }

        let p = self.badge_probability;
        if p > 0.0 && self.rng.gen_bool(p.min(1.0)) {
            return Some(self.rng.r#gen());
        }
        None
    }
}

/// UID of the key tag resting in `slot`.
fn key_tag_bytes(slot: SlotNumber) -> [u8; 4] {
    [0x4B, 0x45, 0x59, slot.as_u8()]
}

/// Handle to the simulated cabinet.
///
/// Cloning is cheap; all clones observe the same cabinet. Tests keep one clone
/// to script badges and inspect relay history while the mock devices hold the
/// others.
///
/// # Examples
///
/// ```
/// use keyrack_core::{Level, MockConfig, SlotConfig, SlotNumber, PinLine};
/// use keyrack_hardware::mock::MockCabinet;
///
/// let slot = SlotNumber::new(1).unwrap();
/// let wiring = [SlotConfig {
///     number: slot,
///     chip_select: PinLine::new(4).unwrap(),
///     relay: PinLine::new(17).unwrap(),
/// }];
/// let cabinet = MockCabinet::new(&wiring, &MockConfig::quiet());
///
/// cabinet.write(PinLine::new(17).unwrap(), Level::High).unwrap();
/// assert_eq!(cabinet.relay_level(slot), Some(Level::High));
/// ```
#[derive(Debug, Clone)]
pub struct MockCabinet {
    state: Arc<Mutex<CabinetState>>,
}

impl MockCabinet {
    /// Build a cabinet wired like `slots`.
    pub fn new(slots: &[SlotConfig], config: &MockConfig) -> Self {
        let mut roles = HashMap::new();
        for slot in slots {
            roles.insert(slot.chip_select, PinRole::ChipSelect(slot.number));
            roles.insert(slot.relay, PinRole::Relay(slot.number));
        }

        let state = CabinetState {
            roles,
            levels: HashMap::new(),
            selected: BTreeSet::new(),
            max_selected: 0,
            selections: HashMap::new(),
            relay_writes: HashMap::new(),
            failing: HashSet::new(),
            windows: HashMap::new(),
            pull_overrides: HashMap::new(),
            badges: HashMap::new(),
            field: None,
            pull_after: config.pull_after(),
            badge_probability: config.badge_probability,
            rng: StdRng::seed_from_u64(config.seed),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CabinetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a pin write.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinWrite` if the pin was marked as failing.
    pub fn write(&self, pin: PinLine, level: Level) -> Result<()> {
        let mut state = self.lock();
        if state.failing.contains(&pin) {
            return Err(HardwareError::pin_write(pin, "simulated write failure"));
        }

        state.levels.insert(pin, level);
        let role = state.roles.get(&pin).copied();
        debug!(%pin, %level, role = ?role, "mock pin write");

        match role {
            Some(PinRole::ChipSelect(slot)) if level == Level::SELECTED => {
                state.selected.insert(slot);
                state.max_selected = state.max_selected.max(state.selected.len());
                *state.selections.entry(slot).or_default() += 1;
                let uid = state.decide_field(slot);
                state.field = Some((slot, uid));
            }
            Some(PinRole::ChipSelect(slot)) => {
                state.selected.remove(&slot);
                if matches!(state.field, Some((active, _)) if active == slot) {
                    state.field = None;
                }
            }
            Some(PinRole::Relay(slot)) => {
                state.relay_writes.entry(slot).or_default().push(level);
                if level == Level::ENERGIZED {
                    let pull_after = state
                        .pull_overrides
                        .get(&slot)
                        .copied()
                        .unwrap_or(state.pull_after);
                    state.windows.insert(
                        slot,
                        KeyWindow {
                            reads: 0,
                            pull_after,
                        },
                    );
                } else {
                    state.windows.remove(&slot);
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Tag in the field of the selected reader.
    ///
    /// # Errors
    ///
    /// Returns a communication error unless exactly one reader is selected.
    pub fn field(&self) -> Result<Option<[u8; 4]>> {
        let state = self.lock();
        match (state.selected.len(), state.field) {
            (1, Some((_, uid))) => Ok(uid),
            (0, _) => Err(HardwareError::communication("no reader selected")),
            _ => Err(HardwareError::communication("bus contention")),
        }
    }

    /// Queue a badge for the next idle selection of `slot`.
    pub fn present_badge(&self, slot: SlotNumber, uid: [u8; 4]) {
        self.lock().badges.entry(slot).or_default().push_back(uid);
    }

    /// Keep the key in `slot` through future verification windows.
    pub fn hold_key(&self, slot: SlotNumber) {
        self.lock().pull_overrides.insert(slot, None);
    }

    /// Pull the key in `slot` after `reads` selections in future windows.
    pub fn pull_after(&self, slot: SlotNumber, reads: u32) {
        self.lock().pull_overrides.insert(slot, Some(reads));
    }

    /// UID of the key tag resting in `slot`.
    #[must_use]
    pub fn key_tag(&self, slot: SlotNumber) -> Option<Uid> {
        Uid::from_bytes(&key_tag_bytes(slot)).ok()
    }

    /// Make writes to `pin` fail until [`MockCabinet::restore_pin`].
    pub fn fail_pin(&self, pin: PinLine) {
        self.lock().failing.insert(pin);
    }

    pub fn restore_pin(&self, pin: PinLine) {
        self.lock().failing.remove(&pin);
    }

    /// Last level written to `pin`.
    #[must_use]
    pub fn level(&self, pin: PinLine) -> Option<Level> {
        self.lock().levels.get(&pin).copied()
    }

    /// Last level written to the relay of `slot`.
    #[must_use]
    pub fn relay_level(&self, slot: SlotNumber) -> Option<Level> {
        let state = self.lock();
        let pin = state
            .roles
            .iter()
            .find(|(_, role)| **role == PinRole::Relay(slot))
            .map(|(pin, _)| *pin)?;
        state.levels.get(&pin).copied()
    }

    /// Every level written to the relay of `slot`, oldest first.
    #[must_use]
    pub fn relay_writes(&self, slot: SlotNumber) -> Vec<Level> {
        self.lock()
            .relay_writes
            .get(&slot)
            .cloned()
            .unwrap_or_default()
    }

    /// Largest number of readers ever selected at once.
    #[must_use]
    pub fn max_selected(&self) -> usize {
        self.lock().max_selected
    }

    /// Readers selected right now.
    #[must_use]
    pub fn selected(&self) -> Vec<SlotNumber> {
        self.lock().selected.iter().copied().collect()
    }

    /// How many times the reader of `slot` has been selected.
    #[must_use]
    pub fn selections(&self, slot: SlotNumber) -> u64 {
        self.lock().selections.get(&slot).copied().unwrap_or(0)
    }
}
