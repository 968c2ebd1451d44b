//! The engine facade tying a backend, a clock and per-owner locks together.
//!
//! Operations live next to the component they belong to:
//! - [`crate::ledger`]: start/stop work and the one-open-session rule
//! - [`crate::tasks`]: task CRUD and completion
//! - [`crate::summary`]: per-task totals and range summaries

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::calendar::DayZone;
use crate::clock::{Clock, SystemClock};
use crate::store::Store;
use crate::types::OwnerId;

/// Time-accounting engine over one storage backend.
///
/// The backend is fixed at construction; nothing in the engine inspects which
/// backend it is talking to.
pub struct Tracker<S, C = SystemClock> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) locks: OwnerLocks,
    pub(crate) day_zone: DayZone,
}

impl<S: Store> Tracker<S> {
    /// Creates an engine on the system clock with local-time day buckets.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: Store, C: Clock> Tracker<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            locks: OwnerLocks::default(),
            day_zone: DayZone::default(),
        }
    }

    /// Sets the time zone used for day buckets and named ranges.
    #[must_use]
    pub const fn with_day_zone(mut self, day_zone: DayZone) -> Self {
        self.day_zone = day_zone;
        self
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub const fn day_zone(&self) -> DayZone {
        self.day_zone
    }
}

/// One mutex per owner, so ledger mutations for the same owner run one at a
/// time while different owners never contend.
#[derive(Debug, Default)]
pub(crate) struct OwnerLocks {
    locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    /// Runs `f` while holding `owner`'s lock.
    ///
    /// The entry is dropped again once no other caller holds or waits on it,
    /// so the map only ever contains owners with work in flight.
    pub(crate) fn serialize<T>(&self, owner: &OwnerId, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(owner.clone()).or_default())
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only taken under the map lock, so a count of two (the
        // map and ours) cannot grow while it is held.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(owner);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
