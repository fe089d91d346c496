use super::{AtomicTracker, AtomicallyUpdate, Number};

/// The most recent measurement of a gauge point.
pub(crate) struct Assign<T>
where
    T: AtomicallyUpdate<T>,
{
    value: T::AtomicTracker,
}

impl<T> Assign<T>
where
    T: Number,
{
    pub(crate) fn new() -> Self {
        Self {
            value: T::new_atomic_tracker(T::default()),
        }
    }

    pub(crate) fn update(&self, value: T) {
        self.value.store(value)
    }

    pub(crate) fn get(&self) -> T {
        self.value.get_value()
    }

    pub(crate) fn clear(&self) {
        self.value.store(T::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_writer_wins() {
        let gauge = Assign::<i64>::new();
        gauge.update(3);
        gauge.update(-7);
        assert_eq!(gauge.get(), -7);
        // reading does not reset
        assert_eq!(gauge.get(), -7);

        gauge.clear();
        assert_eq!(gauge.get(), 0);
    }
}
