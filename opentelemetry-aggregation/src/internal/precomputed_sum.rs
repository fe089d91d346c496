use std::sync::Mutex;

use super::{AtomicTracker, AtomicallyUpdate, Number};

/// The latest observation of an already-cumulative sum.
///
/// Deltas are computed against the value reported by the previous delta
/// collection.
pub(crate) struct Observed<T>
where
    T: AtomicallyUpdate<T>,
{
    value: T::AtomicTracker,
    reported: Mutex<T>,
    monotonic: bool,
}

impl<T> Observed<T>
where
    T: Number,
{
    pub(crate) fn new(monotonic: bool) -> Self {
        Self {
            value: T::new_atomic_tracker(T::default()),
            reported: Mutex::new(T::default()),
            monotonic,
        }
    }

    pub(crate) fn update(&self, value: T) {
        self.value.store(value)
    }

    /// The observed value, or its change since the last delta report.
    pub(crate) fn take(&self, delta: bool) -> T {
        let current = self.value.get_value();
        if !delta {
            return current;
        }

        let mut reported = self.reported.lock().unwrap_or_else(|err| err.into_inner());
        let previous = std::mem::replace(&mut *reported, current);

        // a monotonic source that went backwards was restarted, and unsigned
        // values cannot represent a negative change either
        let unsigned = T::min() >= T::default();
        if current < previous && (self.monotonic || unsigned) {
            current
        } else {
            current - previous
        }
    }

    pub(crate) fn clear(&self) {
        self.value.store(T::default());
        *self.reported.lock().unwrap_or_else(|err| err.into_inner()) = T::default();
    }
}
