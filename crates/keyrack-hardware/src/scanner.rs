//! One tag read on the active slot.
//!
//! An empty field, a corrupt anticollision frame, a bus error and a short UID
//! all mean the same thing to the coordinator: no usable tag right now.

use keyrack_core::Uid;
use tracing::trace;

use crate::bus::ScopedBusAccess;
use crate::error::{HardwareError, Result};
use crate::traits::TagReader;

/// Probe the selected reader and return the tag's normalized UID.
///
/// Read failures are logged at trace level and reported as `None`.
pub fn scan_once(access: &mut ScopedBusAccess<'_>) -> Option<Uid> {
    let slot = access.slot();
    match read_tag(access.reader()) {
        Ok(uid) => {
            trace!(%slot, %uid, "tag read");
            Some(uid)
        }
        Err(HardwareError::NoCard) => {
            trace!(%slot, "no tag");
            None
        }
        Err(e) => {
            trace!(%slot, error = %e, "tag read failed");
            None
        }
    }
}

/// Presence probe followed by a UID read.
///
/// # Errors
///
/// `HardwareError::NoCard` for an empty field, otherwise whatever the reader
/// reported.
pub fn read_tag<R: TagReader>(reader: &mut R) -> Result<Uid> {
    if !reader.is_card_present()? {
        return Err(HardwareError::NoCard);
    }
    let bytes = reader.read_uid()?;
    Uid::from_bytes(&bytes).map_err(|e| HardwareError::communication(e.to_string()))
}
