//! # Event Latch
//!
//! The motion controller signals progress by raising numbered events. The latch records every
//! event raised since it was last read, so that the mission thread can poll for them at its own
//! cadence. Reading an event clears it, which gives edge semantics: an event raised once is only
//! seen once.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Mutex, MutexGuard};

use comms_if::eqpt::ctrl::{EventId, NUM_EVENTS};
use log::warn;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Access to the controller's event flags.
pub trait EventLatch: Send + Sync {
    /// Returns true if `id` has been raised since the last query, and clears it.
    fn is_set(&self, id: EventId) -> bool;

    /// Clear every event.
    fn clear_all(&self);

    /// Record that `id` has been raised.
    fn raise(&self, id: EventId);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Thread safe event latch, intended to be shared between the link's receive path and the mission
/// thread in an `Arc`.
#[derive(Debug)]
pub struct SharedEventLatch {
    flags: Mutex<[bool; NUM_EVENTS]>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SharedEventLatch {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new([false; NUM_EVENTS]),
        }
    }

    fn flags(&self) -> MutexGuard<'_, [bool; NUM_EVENTS]> {
        // The flags are plain booleans so a poisoned lock still holds usable data
        match self.flags.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

impl Default for SharedEventLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLatch for SharedEventLatch {
    fn is_set(&self, id: EventId) -> bool {
        match self.flags().get_mut(id as usize) {
            Some(f) => std::mem::replace(f, false),
            None => {
                warn!("Query for event {} which is out of range (max {})", id, NUM_EVENTS - 1);
                false
            }
        }
    }

    fn clear_all(&self) {
        *self.flags() = [false; NUM_EVENTS];
    }

    fn raise(&self, id: EventId) {
        match self.flags().get_mut(id as usize) {
            Some(f) => *f = true,
            None => warn!("Ignoring event {} which is out of range (max {})", id, NUM_EVENTS - 1),
        }
    }
}
