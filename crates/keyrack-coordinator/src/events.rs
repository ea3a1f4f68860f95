//! Fire-and-forget event emission.
//!
//! Hardware work never waits on the network: events go into a bounded queue
//! with `try_send`, and whatever does not fit is dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use keyrack_core::OutboundEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Sending half of the outbound event queue.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<OutboundEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventEmitter {
    /// Create an emitter and the receiver the event channel drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue `event` without waiting.
    pub fn emit(&self, event: OutboundEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(event = event.name(), slot = ?event.slot(), dropped, "event queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(event = event.name(), slot = ?event.slot(), "event channel closed, dropping event");
            }
        }
    }

    /// Events dropped so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
