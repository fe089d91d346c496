use super::{AtomicTracker, AtomicallyUpdate, Number};

/// The running value of a sum point.
pub(crate) struct Increment<T>
where
    T: AtomicallyUpdate<T>,
{
    value: T::AtomicTracker,
}

impl<T> Increment<T>
where
    T: Number,
{
    pub(crate) fn new() -> Self {
        Self {
            value: T::new_atomic_tracker(T::default()),
        }
    }

    pub(crate) fn update(&self, value: T) {
        self.value.add(value)
    }

    /// Reads the sum, clearing it when reporting deltas.
    pub(crate) fn take(&self, reset: bool) -> T {
        if reset {
            self.value.get_and_reset_value()
        } else {
            self.value.get_value()
        }
    }

    pub(crate) fn clear(&self) {
        self.value.store(T::default());
    }
}
