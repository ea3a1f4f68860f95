//! Messages exchanged with the remote authority.
//!
//! Each message is a JSON object whose `event` field names the message kind,
//! matching the event names the booking backend already listens for:
//!
//! ```text
//! in : {"event":"gpio:unlock","slotNumber":3,"correlationToken":"txn-77"}
//! out: {"event":"slot:unlocked","slotNumber":3,"success":true}
//! out: {"event":"nfc:tag","slotNumber":2,"uid":"DEADBEEF","observedAt":"..."}
//! out: {"event":"key:pulled","slotNumber":3,"correlationToken":"txn-77"}
//! out: {"event":"borrow:cancelled","slotNumber":3,"correlationToken":"txn-77"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CorrelationToken, SlotNumber, TagReading, Uid};

/// Command received from the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum InboundCommand {
    /// Open a slot and verify that its key gets pulled.
    #[serde(rename = "gpio:unlock", rename_all = "camelCase")]
    UnlockSlot {
        slot_number: SlotNumber,
        #[serde(alias = "bookingId")]
        correlation_token: CorrelationToken,
    },
}

/// Event sent to the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutboundEvent {
    /// Subscription handshake, sent by the channel on every connection.
    #[serde(rename = "join:gpio")]
    Join,

    /// A relay drive was attempted.
    #[serde(rename = "slot:unlocked", rename_all = "camelCase")]
    SlotUnlocked { slot_number: SlotNumber, success: bool },

    /// A tag was presented to a reader outside any verification window.
    #[serde(rename = "nfc:tag", rename_all = "camelCase")]
    TagObserved {
        slot_number: SlotNumber,
        uid: Uid,
        observed_at: DateTime<Utc>,
    },

    /// The key left its slot within the verification window.
    #[serde(rename = "key:pulled", rename_all = "camelCase")]
    KeyPulled {
        slot_number: SlotNumber,
        correlation_token: CorrelationToken,
    },

    /// The verification window expired with the key still in place.
    #[serde(rename = "borrow:cancelled", rename_all = "camelCase")]
    BorrowCancelled {
        slot_number: SlotNumber,
        correlation_token: CorrelationToken,
    },
}

impl OutboundEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Join => "join:gpio",
            OutboundEvent::SlotUnlocked { .. } => "slot:unlocked",
            OutboundEvent::TagObserved { .. } => "nfc:tag",
            OutboundEvent::KeyPulled { .. } => "key:pulled",
            OutboundEvent::BorrowCancelled { .. } => "borrow:cancelled",
        }
    }

    /// Slot the event refers to, if any.
    #[must_use]
    pub fn slot(&self) -> Option<SlotNumber> {
        match self {
            OutboundEvent::Join => None,
            OutboundEvent::SlotUnlocked { slot_number, .. }
            | OutboundEvent::TagObserved { slot_number, .. }
            | OutboundEvent::KeyPulled { slot_number, .. }
            | OutboundEvent::BorrowCancelled { slot_number, .. } => Some(*slot_number),
        }
    }

    /// Whether the event ends a verification window.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboundEvent::KeyPulled { .. } | OutboundEvent::BorrowCancelled { .. }
        )
    }
}

impl From<TagReading> for OutboundEvent {
    fn from(reading: TagReading) -> Self {
        OutboundEvent::TagObserved {
            slot_number: reading.slot,
            uid: reading.uid,
            observed_at: reading.observed_at,
        }
    }
}
