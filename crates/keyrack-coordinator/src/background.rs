//! Round-robin background scanning.
//!
//! Every tick reads exactly one slot, cycling through the cabinet in slot
//! order. Pending slots belong to their verification task and are skipped
//! without touching the bus; the cursor still advances past them.

use std::sync::Arc;
use std::time::Duration;

use keyrack_core::{SlotNumber, TagReading, Uid};
use keyrack_hardware::{HardwareContext, scan_once};
use tokio::task::spawn_blocking;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::events::EventEmitter;
use crate::slot::SlotTable;

/// Cyclic position over the configured slots.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    slots: Vec<SlotNumber>,
    next: usize,
}

impl ScanCursor {
    #[must_use]
    pub fn new(mut slots: Vec<SlotNumber>) -> Self {
        slots.sort();
        slots.dedup();
        Self { slots, next: 0 }
    }

    /// Slot for this tick; `None` for an empty cabinet.
    pub fn advance(&mut self) -> Option<SlotNumber> {
        let slot = *self.slots.get(self.next)?;
        self.next = (self.next + 1) % self.slots.len();
        Some(slot)
    }
}

/// What one background tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No slots configured.
    Empty,
    /// The slot was busy; the bus was not touched.
    Skipped(SlotNumber),
    /// The slot was read.
    Scanned(SlotNumber, Option<Uid>),
}

/// Background loop state.
#[derive(Debug)]
pub struct BackgroundScanner {
    context: HardwareContext,
    table: Arc<SlotTable>,
    emitter: EventEmitter,
    cursor: ScanCursor,
}

impl BackgroundScanner {
    pub fn new(context: HardwareContext, table: Arc<SlotTable>, emitter: EventEmitter) -> Self {
        let cursor = ScanCursor::new(context.slot_numbers());
        Self {
            context,
            table,
            emitter,
            cursor,
        }
    }

    /// Read the next slot in turn.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(slot) = self.cursor.advance() else {
            return TickOutcome::Empty;
        };
        if !self.table.claim_for_background(slot) {
            trace!(%slot, "slot busy, skipping");
            return TickOutcome::Skipped(slot);
        }

        let uid = match self.context.bus().activate(slot) {
            Ok(mut access) => {
                let uid = scan_once(&mut access);
                if let Err(e) = access.release() {
                    warn!(%slot, error = %e, "failed to release bus");
                }
                uid
            }
            Err(e) => {
                debug!(%slot, error = %e, "background read failed");
                None
            }
        };
        if !self.table.release_background(slot, uid.as_ref()) {
            debug!(%slot, "slot unlocked during background read, dropping reading");
            return TickOutcome::Scanned(slot, None);
        }

        if let Some(uid) = &uid {
            info!(%slot, %uid, "tag observed");
            self.emitter.emit(TagReading::now(slot, uid.clone()).into());
        }
        TickOutcome::Scanned(slot, uid)
    }

    /// Tick every `period` until `cancel` fires.
    ///
    /// Each tick runs on the blocking pool, since a read blocks on the bus
    /// lock and on the GPIO tool.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "background scan started");

        let mut scanner = self;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            scanner = match spawn_blocking(move || {
                scanner.tick();
                scanner
            })
            .await
            {
                Ok(scanner) => scanner,
                Err(e) => {
                    error!(error = %e, "background tick failed");
                    break;
                }
            };
        }
        info!("background scan stopped");
    }
}
