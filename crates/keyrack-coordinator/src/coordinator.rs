//! The key-release coordinator.
//!
//! Accepts unlock commands, drives the relay, spawns one verification task
//! per unlocked slot and runs the background scan. All bus traffic goes
//! through the hardware context's arbiter; all slot bookkeeping through the
//! shared [`SlotTable`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keyrack_core::{CorrelationToken, InboundCommand, OutboundEvent, SlotNumber, TimingConfig};
use keyrack_hardware::HardwareContext;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::background::BackgroundScanner;
use crate::error::{CoordinatorError, Result};
use crate::events::EventEmitter;
use crate::slot::{SlotState, SlotTable};
use crate::verification::{Verification, VerificationOutcome};

/// Result of an accepted unlock command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Relay opened; a verification task is running.
    VerificationStarted,
    /// The relay could not be driven; the slot stays idle.
    RelayFailed,
}

#[derive(Debug, Default)]
struct Tasks {
    verifications: HashMap<SlotNumber, JoinHandle<VerificationOutcome>>,
    background: Option<JoinHandle<()>>,
}

/// Coordinates unlocks, verifications and background scans for one cabinet.
#[derive(Debug)]
pub struct KeyReleaseCoordinator {
    context: HardwareContext,
    table: Arc<SlotTable>,
    emitter: EventEmitter,
    timing: TimingConfig,
    cancel: CancellationToken,
    tasks: Mutex<Tasks>,
}

impl KeyReleaseCoordinator {
    /// # Errors
    ///
    /// `CoordinatorError::Core` if a timing period is zero or the
    /// verification window is shorter than one tick.
    pub fn new(
        context: HardwareContext,
        timing: TimingConfig,
        emitter: EventEmitter,
    ) -> Result<Self> {
        timing.validate()?;
        let table = Arc::new(SlotTable::new(context.slots()));
        Ok(Self {
            context,
            table,
            emitter,
            timing,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Tasks::default()),
        })
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch one command from the remote authority.
    ///
    /// # Errors
    ///
    /// See [`unlock_slot`](Self::unlock_slot).
    pub fn handle_command(&self, command: InboundCommand) -> Result<UnlockOutcome> {
        match command {
            InboundCommand::UnlockSlot {
                slot_number,
                correlation_token,
            } => self.unlock_slot(slot_number, correlation_token),
        }
    }

    /// Open `slot` and start verifying that its key gets pulled.
    ///
    /// Emits `SlotUnlocked` with the relay result. A rejected command leaves
    /// the slot, the relay and the running verification untouched.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::ShuttingDown` after [`shutdown`](Self::shutdown)
    /// - `CoordinatorError::UnknownSlot` for an unconfigured slot; a failed
    ///   `SlotUnlocked` is still emitted
    /// - `CoordinatorError::AlreadyPending` while the slot is being unlocked
    ///   or verified; nothing is emitted
    pub fn unlock_slot(&self, slot: SlotNumber, token: CorrelationToken) -> Result<UnlockOutcome> {
        if self.cancel.is_cancelled() {
            warn!(%slot, %token, "unlock rejected, shutting down");
            return Err(CoordinatorError::ShuttingDown);
        }
        if !self.table.contains(slot) {
            warn!(%slot, %token, "unlock requested for unknown slot");
            self.emitter.emit(OutboundEvent::SlotUnlocked {
                slot_number: slot,
                success: false,
            });
            return Err(CoordinatorError::UnknownSlot { slot });
        }
        if let Err(e) = self.table.begin_unlock(slot) {
            warn!(%slot, %token, error = %e, "unlock rejected");
            return Err(e);
        }

        let success = self.context.relays().unlock(slot);
        self.emitter.emit(OutboundEvent::SlotUnlocked {
            slot_number: slot,
            success,
        });
        if !success {
            self.table.abort_unlock(slot)?;
            return Ok(UnlockOutcome::RelayFailed);
        }

        let started = Instant::now();
        let deadline = started + self.timing.verification_timeout();
        self.table.enter_awaiting(slot, deadline)?;

        let verification = Verification::new(
            slot,
            token.clone(),
            self.context.clone(),
            Arc::clone(&self.table),
            self.emitter.clone(),
            started,
            self.timing.verification_interval(),
            deadline,
            self.cancel.child_token(),
        );
        let handle = tokio::spawn(verification.run());

        let mut tasks = self.lock_tasks();
        tasks.verifications.retain(|_, task| !task.is_finished());
        tasks.verifications.insert(slot, handle);
        info!(
            %slot,
            %token,
            timeout_ms = self.timing.verification_timeout_ms,
            "verification started"
        );
        Ok(UnlockOutcome::VerificationStarted)
    }

    /// Start the background scan loop; a second call is a no-op.
    pub fn spawn_background(&self) {
        let mut tasks = self.lock_tasks();
        if tasks.background.is_some() {
            warn!("background scan already running");
            return;
        }
        let scanner = self.background_scanner();
        tasks.background = Some(tokio::spawn(
            scanner.run(self.timing.background_interval(), self.cancel.child_token()),
        ));
    }

    /// A scanner sharing this coordinator's slot table, for driving ticks by
    /// hand.
    #[must_use]
    pub fn background_scanner(&self) -> BackgroundScanner {
        BackgroundScanner::new(
            self.context.clone(),
            Arc::clone(&self.table),
            self.emitter.clone(),
        )
    }

    /// Stop everything and leave the cabinet locked.
    ///
    /// Open verifications resolve as cancelled borrows, each emitting its
    /// terminal event; then every relay is driven low.
    pub async fn shutdown(&self) {
        info!("coordinator shutting down");
        self.cancel.cancel();

        let (background, verifications) = {
            let mut tasks = self.lock_tasks();
            (
                tasks.background.take(),
                std::mem::take(&mut tasks.verifications),
            )
        };

        if let Some(handle) = background {
            if let Err(e) = handle.await {
                error!(error = %e, "background scan task failed");
            }
        }
        for (slot, handle) in verifications {
            match handle.await {
                Ok(outcome) => info!(%slot, %outcome, "verification stopped"),
                Err(e) => error!(%slot, error = %e, "verification task failed"),
            }
        }

        let relays = Arc::clone(self.context.relays());
        match tokio::task::spawn_blocking(move || relays.lock_all()).await {
            Ok(()) => info!("all relays locked"),
            Err(e) => error!(error = %e, "locking relays failed"),
        }
    }

    #[must_use]
    pub fn is_pending(&self, slot: SlotNumber) -> bool {
        self.table.is_pending(slot)
    }

    #[must_use]
    pub fn slot_state(&self, slot: SlotNumber) -> Option<SlotState> {
        self.table.state(slot)
    }

    #[must_use]
    pub fn table(&self) -> &Arc<SlotTable> {
        &self.table
    }

    #[must_use]
    pub fn context(&self) -> &HardwareContext {
        &self.context
    }

    /// Verification tasks still running.
    #[must_use]
    pub fn active_verifications(&self) -> usize {
        self.lock_tasks()
            .verifications
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Events dropped because the outbound queue was full or closed.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.emitter.dropped()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
