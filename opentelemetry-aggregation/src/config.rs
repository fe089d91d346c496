use std::{collections::HashSet, fmt, sync::Arc};

use opentelemetry::{Key, KeyValue};

use crate::{
    data::Temporality,
    error::{MetricError, MetricResult},
    internal::Filter,
    Aggregation,
};

/// The cardinality limit used when none is configured.
pub const DEFAULT_CARDINALITY_LIMIT: usize = 2000;

/// Configuration of an [AggregatorStore](crate::AggregatorStore).
///
/// Everything here is fixed when the store is created.
///
/// # Examples
///
/// ```
/// use opentelemetry_aggregation::{Aggregation, AggregatorConfig, Temporality};
///
/// let config = AggregatorConfig::new(Aggregation::Sum { monotonic: true })
///     .with_temporality(Temporality::Delta)
///     .with_cardinality_limit(100)
///     .with_reclaim_unused_points(true);
/// assert_eq!(config.cardinality_limit(), 100);
/// ```
#[derive(Clone)]
pub struct AggregatorConfig {
    pub(crate) aggregation: Aggregation,
    pub(crate) temporality: Temporality,
    pub(crate) cardinality_limit: usize,
    pub(crate) emit_overflow_attribute: bool,
    pub(crate) reclaim_unused_points: bool,
    pub(crate) attribute_filter: Option<Filter>,
    pub(crate) allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
}

impl AggregatorConfig {
    /// Configuration for `aggregation` with cumulative temporality, the
    /// default cardinality limit and the overflow attribute enabled.
    pub fn new(aggregation: Aggregation) -> Self {
        AggregatorConfig {
            aggregation,
            temporality: Temporality::default(),
            cardinality_limit: DEFAULT_CARDINALITY_LIMIT,
            emit_overflow_attribute: true,
            reclaim_unused_points: false,
            attribute_filter: None,
            allowed_attribute_keys: None,
        }
    }

    /// Set the temporality collections report with.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Set the maximum number of metric points, reserved points included.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = limit;
        self
    }

    /// Whether measurements beyond the cardinality limit are aggregated into a
    /// point tagged `otel.metric.overflow = true` instead of being dropped.
    pub fn with_overflow_attribute(mut self, enabled: bool) -> Self {
        self.emit_overflow_attribute = enabled;
        self
    }

    /// Whether points that received no measurement since the previous
    /// collection are released for other attribute sets.
    ///
    /// Only honoured for [Temporality::Delta].
    pub fn with_reclaim_unused_points(mut self, enabled: bool) -> Self {
        self.reclaim_unused_points = enabled;
        self
    }

    /// Keep only attributes for which `filter` returns `true`.
    pub fn with_attribute_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&KeyValue) -> bool + Send + Sync + 'static,
    {
        self.attribute_filter = Some(Arc::new(filter));
        self
    }

    /// Keep only attributes whose key is in `attribute_keys`.
    ///
    /// An empty set drops every attribute.
    pub fn with_allowed_attribute_keys(
        mut self,
        attribute_keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        self.allowed_attribute_keys = Some(Arc::new(attribute_keys.into_iter().collect()));
        self
    }

    /// The configured aggregation.
    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// The configured temporality.
    pub fn temporality(&self) -> Temporality {
        self.temporality
    }

    /// The configured cardinality limit.
    pub fn cardinality_limit(&self) -> usize {
        self.cardinality_limit
    }

    /// Number of points that exist regardless of recorded attributes.
    pub(crate) fn reserved_points(&self) -> usize {
        if self.emit_overflow_attribute {
            2
        } else {
            1
        }
    }

    /// Reclamation only makes sense when every collection resets the points.
    pub(crate) fn reclaims(&self) -> bool {
        self.reclaim_unused_points && self.temporality == Temporality::Delta
    }

    /// Combines the allow-list and the predicate into one filter.
    pub(crate) fn filter(&self) -> Option<Filter> {
        match (&self.allowed_attribute_keys, &self.attribute_filter) {
            (None, None) => None,
            (None, Some(filter)) => Some(filter.clone()),
            (Some(keys), None) => {
                let keys = keys.clone();
                Some(Arc::new(move |kv: &KeyValue| keys.contains(&kv.key)))
            }
            (Some(keys), Some(filter)) => {
                let keys = keys.clone();
                let filter = filter.clone();
                Some(Arc::new(move |kv: &KeyValue| {
                    keys.contains(&kv.key) && filter(kv)
                }))
            }
        }
    }

    pub(crate) fn validate(&self) -> MetricResult<()> {
        self.aggregation.validate()?;

        let minimum = self.reserved_points() + 1;
        if self.cardinality_limit < minimum {
            return Err(MetricError::Config(format!(
                "cardinality limit ({}) must be at least {minimum}",
                self.cardinality_limit
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for AggregatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorConfig")
            .field("aggregation", &self.aggregation)
            .field("temporality", &self.temporality)
            .field("cardinality_limit", &self.cardinality_limit)
            .field("emit_overflow_attribute", &self.emit_overflow_attribute)
            .field("reclaim_unused_points", &self.reclaim_unused_points)
            .field("attribute_filter", &self.attribute_filter.is_some())
            .field("allowed_attribute_keys", &self.allowed_attribute_keys)
            .finish()
    }
}
