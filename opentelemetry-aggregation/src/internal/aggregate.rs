use std::{
    fmt,
    mem::replace,
    ops::DerefMut,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use opentelemetry::KeyValue;

/// The window a collection covers.
pub(crate) struct AggregateTime {
    pub(crate) start: SystemTime,
    pub(crate) current: SystemTime,
}

/// Tracks the start of the current collection window.
pub(crate) struct AggregateTimeInitiator(Mutex<SystemTime>);

impl AggregateTimeInitiator {
    /// Closes the current window and opens the next one at the same instant.
    pub(crate) fn delta(&self) -> AggregateTime {
        let current_time = SystemTime::now();
        let start_time = self
            .0
            .lock()
            .map(|mut start| replace(start.deref_mut(), current_time))
            .unwrap_or(current_time);
        AggregateTime {
            start: start_time,
            current: current_time,
        }
    }

    /// The window from store creation until now.
    pub(crate) fn cumulative(&self) -> AggregateTime {
        let current_time = SystemTime::now();
        let start_time = self.0.lock().map(|start| *start).unwrap_or(current_time);
        AggregateTime {
            start: start_time,
            current: current_time,
        }
    }
}

impl Default for AggregateTimeInitiator {
    fn default() -> Self {
        Self(Mutex::new(SystemTime::now()))
    }
}

pub(crate) type Filter = Arc<dyn Fn(&KeyValue) -> bool + Send + Sync>;

/// Applies filter on provided attribute set
/// No-op, if filter is not set
#[derive(Clone)]
pub(crate) struct AttributeSetFilter {
    filter: Option<Filter>,
}

impl AttributeSetFilter {
    pub(crate) fn new(filter: Option<Filter>) -> Self {
        Self { filter }
    }

    pub(crate) fn apply<R>(&self, attrs: &[KeyValue], run: impl FnOnce(&[KeyValue]) -> R) -> R {
        if let Some(filter) = &self.filter {
            let filtered_attrs: Vec<KeyValue> =
                attrs.iter().filter(|kv| filter(kv)).cloned().collect();
            run(&filtered_attrs)
        } else {
            run(attrs)
        }
    }
}

impl fmt::Debug for AttributeSetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSetFilter")
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
