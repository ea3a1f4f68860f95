//! Key-pull verification after an unlock.
//!
//! One task per unlocked slot polls the slot's reader once per tick, the
//! first tick one period after the unlock. An empty field means the key was
//! taken; a tag still present at or past the deadline cancels the borrow.
//! Either way the relay is closed, the slot leaves the pending set, and
//! exactly one terminal event is emitted.
//!
//! Reads and relay writes block on the GPIO tool, so they run on the
//! blocking pool.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use keyrack_core::{CorrelationToken, OutboundEvent, SlotNumber};
use keyrack_hardware::{HardwareContext, scan_once};
use tokio::task::spawn_blocking;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::EventEmitter;
use crate::slot::SlotTable;

/// How a verification ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The field was empty on tick `ticks`.
    KeyPulled { ticks: u32 },
    /// The key was still present when the window closed.
    TimedOut { ticks: u32 },
    /// The coordinator shut down first.
    Cancelled { ticks: u32 },
}

impl VerificationOutcome {
    #[must_use]
    pub fn ticks(&self) -> u32 {
        match self {
            VerificationOutcome::KeyPulled { ticks }
            | VerificationOutcome::TimedOut { ticks }
            | VerificationOutcome::Cancelled { ticks } => *ticks,
        }
    }

    #[must_use]
    pub fn key_pulled(&self) -> bool {
        matches!(self, VerificationOutcome::KeyPulled { .. })
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::KeyPulled { .. } => write!(f, "key pulled"),
            VerificationOutcome::TimedOut { .. } => write!(f, "timed out"),
            VerificationOutcome::Cancelled { .. } => write!(f, "cancelled"),
        }
    }
}

/// A verification window for one slot.
#[derive(Debug)]
pub struct Verification {
    slot: SlotNumber,
    token: CorrelationToken,
    context: HardwareContext,
    table: Arc<SlotTable>,
    emitter: EventEmitter,
    started: Instant,
    period: Duration,
    deadline: Instant,
    cancel: CancellationToken,
}

impl Verification {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slot: SlotNumber,
        token: CorrelationToken,
        context: HardwareContext,
        table: Arc<SlotTable>,
        emitter: EventEmitter,
        started: Instant,
        period: Duration,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            slot,
            token,
            context,
            table,
            emitter,
            started,
            period,
            deadline,
            cancel,
        }
    }

    /// Poll until the window resolves.
    pub async fn run(self) -> VerificationOutcome {
        let mut ticker = interval_at(self.started + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u32;

        let outcome = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    break VerificationOutcome::Cancelled { ticks };
                }
                _ = ticker.tick() => {
                    ticks += 1;
                    if !self.key_present().await {
                        break VerificationOutcome::KeyPulled { ticks };
                    }
                    if Instant::now() >= self.deadline {
                        break VerificationOutcome::TimedOut { ticks };
                    }
                    debug!(slot = %self.slot, tick = ticks, "key still present");
                }
            }
        };

        let slot = self.slot;
        if let Err(e) = spawn_blocking(move || self.resolve(outcome)).await {
            error!(%slot, error = %e, "verification resolution failed");
        }
        outcome
    }

    /// One read on the slot's reader, off the async workers. A bus failure
    /// counts as present so a glitch never reports a pull.
    async fn key_present(&self) -> bool {
        let context = self.context.clone();
        let slot = self.slot;
        match spawn_blocking(move || read_slot(&context, slot)).await {
            Ok(present) => present,
            Err(e) => {
                warn!(%slot, error = %e, "verification read aborted, assuming key present");
                true
            }
        }
    }

    fn resolve(&self, outcome: VerificationOutcome) {
        if let Err(e) = self.table.begin_locking(self.slot) {
            warn!(slot = %self.slot, error = %e, "unexpected slot state at resolution");
        }
        self.context.relays().lock(self.slot);
        if let Err(e) = self.table.finish(self.slot) {
            warn!(slot = %self.slot, error = %e, "unexpected slot state after locking");
        }

        info!(
            slot = %self.slot,
            token = %self.token,
            ticks = outcome.ticks(),
            %outcome,
            "verification resolved"
        );
        let event = if outcome.key_pulled() {
            OutboundEvent::KeyPulled {
                slot_number: self.slot,
                correlation_token: self.token.clone(),
            }
        } else {
            OutboundEvent::BorrowCancelled {
                slot_number: self.slot,
                correlation_token: self.token.clone(),
            }
        };
        self.emitter.emit(event);
    }
}

fn read_slot(context: &HardwareContext, slot: SlotNumber) -> bool {
    match context.bus().activate(slot) {
        Ok(mut access) => {
            let present = scan_once(&mut access).is_some();
            if let Err(e) = access.release() {
                warn!(%slot, error = %e, "failed to release bus");
            }
            present
        }
        Err(e) => {
            warn!(%slot, error = %e, "verification read failed, assuming key present");
            true
        }
    }
}
