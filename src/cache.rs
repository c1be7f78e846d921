use std::sync::{Arc, Mutex};

use chrono::DateTime;
use chrono_tz::Tz;

/// A value together with the wall-clock time it was observed.
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub value: T,

    pub observed_at: DateTime<Tz>,
}

/// Single-slot latest-reading store shared between one poller thread and
/// the supervisory loop.
///
/// `set` replaces the whole slot under the mutex, so a reader observes
/// either the previous complete reading or the new complete reading,
/// never a mix of the two. Entries never expire; `get` returns the most
/// recent value however old it is.
#[derive(Debug)]
pub struct ReadingCache<T> {
    slot: Arc<Mutex<Option<Stamped<T>>>>,
}

impl<T> Clone for ReadingCache<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> Default for ReadingCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ReadingCache<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Overwrite the slot unconditionally.
    pub fn set(&self, value: T, now: DateTime<Tz>) {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            // A poisoned slot only ever holds a complete reading; keep going.
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Stamped {
            value,
            observed_at: now,
        });
    }

    /// Non-blocking snapshot of the latest reading, if any ever arrived.
    pub fn get(&self) -> Option<Stamped<T>> {
        let slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone()
    }
}
