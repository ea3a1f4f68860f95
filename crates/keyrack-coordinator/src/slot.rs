//! Per-slot state and the pending set.
//!
//! # States
//!
//! - `Idle`: locked, no verification, eligible for background scans
//! - `ScanningBackground`: the background loop is reading this slot
//! - `Unlocking`: an unlock command was accepted, relay drive in progress
//! - `AwaitingPull`: relay open, verification task polling for the key
//! - `Locking`: verification resolved, relay being closed
//!
//! # Valid Transitions
//!
//! - Idle → ScanningBackground → Idle
//! - Idle/ScanningBackground → Unlocking → AwaitingPull → Locking → Idle
//! - Unlocking → Idle (relay drive failed)
//!
//! A slot is *pending* exactly while it is `AwaitingPull`. Slot states and
//! the pending set live behind one lock so the background loop and the
//! command handler always see them agree.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use keyrack_core::{SlotConfig, SlotNumber, Uid};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{CoordinatorError, Result};

/// Transitions kept per slot for diagnostics.
const MAX_HISTORY_SIZE: usize = 32;

/// Lifecycle of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    ScanningBackground,
    Unlocking,
    AwaitingPull,
    Locking,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SlotState::Idle => "Idle",
            SlotState::ScanningBackground => "ScanningBackground",
            SlotState::Unlocking => "Unlocking",
            SlotState::AwaitingPull => "AwaitingPull",
            SlotState::Locking => "Locking",
        };
        write!(f, "{state_str}")
    }
}

impl SlotState {
    /// Whether `self -> target` is a legal move.
    #[must_use]
    pub fn can_transition_to(&self, target: &SlotState) -> bool {
        use SlotState::*;

        matches!(
            (self, target),
            // Background scan claims and releases an idle slot
            (Idle, ScanningBackground)
                | (ScanningBackground, Idle)
                // An unlock may preempt a background read in flight
                | (Idle, Unlocking)
                | (ScanningBackground, Unlocking)
                // Relay open, or relay failed
                | (Unlocking, AwaitingPull)
                | (Unlocking, Idle)
                // Verification resolved
                | (AwaitingPull, Locking)
                | (Locking, Idle)
        )
    }

    /// Whether an unlock command may be accepted in this state.
    #[must_use]
    pub fn accepts_unlock(&self) -> bool {
        matches!(self, SlotState::Idle | SlotState::ScanningBackground)
    }
}

/// Record of one state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SlotState,
    pub to: SlotState,
    pub at: Instant,
}

/// One slot's runtime record.
#[derive(Debug, Clone)]
pub struct Slot {
    config: SlotConfig,
    state: SlotState,
    verification_deadline: Option<Instant>,
    last_seen_tag: Option<Uid>,
    history: VecDeque<StateTransition>,
}

impl Slot {
    #[must_use]
    pub fn new(config: SlotConfig) -> Self {
        Self {
            config,
            state: SlotState::Idle,
            verification_deadline: None,
            last_seen_tag: None,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    #[must_use]
    pub fn number(&self) -> SlotNumber {
        self.config.number
    }

    #[must_use]
    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Deadline of the running verification, if any.
    #[must_use]
    pub fn verification_deadline(&self) -> Option<Instant> {
        self.verification_deadline
    }

    /// Last UID the background loop read on this slot.
    #[must_use]
    pub fn last_seen_tag(&self) -> Option<&Uid> {
        self.last_seen_tag.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Move to `new_state`, recording the change.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::InvalidStateTransition` for an illegal move;
    /// the slot is left untouched.
    pub fn transition_to(&mut self, new_state: SlotState) -> Result<StateTransition> {
        if !self.state.can_transition_to(&new_state) {
            return Err(CoordinatorError::InvalidStateTransition {
                slot: self.number(),
                from: self.state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition {
            from: self.state,
            to: new_state,
            at: Instant::now(),
        };
        trace!(slot = %self.number(), from = %transition.from, to = %transition.to, "slot state");
        self.state = new_state;
        if new_state != SlotState::AwaitingPull {
            self.verification_deadline = None;
        }
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        Ok(transition)
    }
}

#[derive(Debug)]
struct TableState {
    slots: BTreeMap<SlotNumber, Slot>,
    pending: HashSet<SlotNumber>,
}

impl TableState {
    fn slot_mut(&mut self, number: SlotNumber) -> Result<&mut Slot> {
        self.slots
            .get_mut(&number)
            .ok_or(CoordinatorError::UnknownSlot { slot: number })
    }
}

/// All slots plus the pending set, guarded together.
#[derive(Debug)]
pub struct SlotTable {
    inner: Mutex<TableState>,
}

impl SlotTable {
    pub fn new(slots: &[SlotConfig]) -> Self {
        let slots = slots
            .iter()
            .map(|config| (config.number, Slot::new(*config)))
            .collect();
        Self {
            inner: Mutex::new(TableState {
                slots,
                pending: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn contains(&self, number: SlotNumber) -> bool {
        self.lock().slots.contains_key(&number)
    }

    /// Claim an idle, non-pending slot for one background read.
    ///
    /// Returns `false` when the slot is busy or unknown.
    pub fn claim_for_background(&self, number: SlotNumber) -> bool {
        let mut table = self.lock();
        if table.pending.contains(&number) {
            return false;
        }
        match table.slots.get_mut(&number) {
            Some(slot) if slot.state() == SlotState::Idle => {
                slot.transition_to(SlotState::ScanningBackground).is_ok()
            }
            _ => false,
        }
    }

    /// End a background read, remembering what it saw.
    ///
    /// Returns `false`, recording nothing, if an unlock took the slot over
    /// meanwhile; the reading must then be discarded.
    pub fn release_background(&self, number: SlotNumber, tag: Option<&Uid>) -> bool {
        let mut table = self.lock();
        let Some(slot) = table.slots.get_mut(&number) else {
            return false;
        };
        if slot.state() != SlotState::ScanningBackground {
            return false;
        }
        if let Some(uid) = tag {
            slot.last_seen_tag = Some(uid.clone());
        }
        slot.transition_to(SlotState::Idle).is_ok()
    }

    /// Accept an unlock for `number`.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::UnknownSlot` if the slot is not configured
    /// - `CoordinatorError::AlreadyPending` if an unlock or verification is in
    ///   flight; nothing changes
    pub fn begin_unlock(&self, number: SlotNumber) -> Result<()> {
        let mut table = self.lock();
        let pending = table.pending.contains(&number);
        let slot = table.slot_mut(number)?;
        if pending || !slot.state().accepts_unlock() {
            debug!(slot = %number, state = %slot.state(), "unlock rejected");
            return Err(CoordinatorError::AlreadyPending { slot: number });
        }
        slot.transition_to(SlotState::Unlocking)?;
        Ok(())
    }

    /// Roll back an unlock whose relay drive failed.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unknown or not `Unlocking`.
    pub fn abort_unlock(&self, number: SlotNumber) -> Result<()> {
        let mut table = self.lock();
        table.slot_mut(number)?.transition_to(SlotState::Idle)?;
        Ok(())
    }

    /// Relay is open: mark the slot pending until `deadline`.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unknown or not `Unlocking`.
    pub fn enter_awaiting(&self, number: SlotNumber, deadline: Instant) -> Result<()> {
        let mut table = self.lock();
        let slot = table.slot_mut(number)?;
        slot.transition_to(SlotState::AwaitingPull)?;
        slot.verification_deadline = Some(deadline);
        table.pending.insert(number);
        Ok(())
    }

    /// Verification resolved: leave the pending set and start locking.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unknown or not `AwaitingPull`.
    pub fn begin_locking(&self, number: SlotNumber) -> Result<()> {
        let mut table = self.lock();
        table.slot_mut(number)?.transition_to(SlotState::Locking)?;
        table.pending.remove(&number);
        Ok(())
    }

    /// Relay closed: back to idle.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unknown or not `Locking`.
    pub fn finish(&self, number: SlotNumber) -> Result<()> {
        let mut table = self.lock();
        table.slot_mut(number)?.transition_to(SlotState::Idle)?;
        Ok(())
    }

    #[must_use]
    pub fn is_pending(&self, number: SlotNumber) -> bool {
        self.lock().pending.contains(&number)
    }

    /// Pending slots, ascending.
    #[must_use]
    pub fn pending(&self) -> Vec<SlotNumber> {
        let mut pending: Vec<_> = self.lock().pending.iter().copied().collect();
        pending.sort();
        pending
    }

    #[must_use]
    pub fn state(&self, number: SlotNumber) -> Option<SlotState> {
        self.lock().slots.get(&number).map(Slot::state)
    }

    #[must_use]
    pub fn deadline(&self, number: SlotNumber) -> Option<Instant> {
        self.lock()
            .slots
            .get(&number)
            .and_then(Slot::verification_deadline)
    }

    #[must_use]
    pub fn last_seen_tag(&self, number: SlotNumber) -> Option<Uid> {
        self.lock()
            .slots
            .get(&number)
            .and_then(|slot| slot.last_seen_tag().cloned())
    }

    /// Copy of one slot's record.
    #[must_use]
    pub fn snapshot(&self, number: SlotNumber) -> Option<Slot> {
        self.lock().slots.get(&number).cloned()
    }
}
