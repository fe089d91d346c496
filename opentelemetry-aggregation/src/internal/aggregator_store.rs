use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, RwLock,
    },
};

use opentelemetry::{otel_debug, otel_warn, KeyValue};

use crate::{
    attribute_set::{canonical_attributes, overflow_attributes},
    data::{ExponentialHistogram, Gauge, Histogram, MetricData, Sum, Temporality},
    error::MetricResult,
    AggregatorConfig,
};

use super::{
    aggregate::{AggregateTime, AggregateTimeInitiator, AttributeSetFilter},
    hashed::{Hashed, HashedNoOpBuilder},
    metric_point::{MetricPoint, PointKind},
    Number,
};

/// Slot of measurements recorded without attributes.
const NO_ATTRIBUTES_INDEX: usize = 0;
/// Slot of measurements beyond the cardinality limit, when enabled.
const OVERFLOW_INDEX: usize = 1;

type LookupKey = Hashed<'static, [KeyValue]>;

/// Attribute sets to slot indices, and the slots available for new sets.
struct Lookup {
    indices: HashMap<LookupKey, usize, HashedNoOpBuilder>,
    /// Every key pointing at a slot, so reclamation can unmap it.
    slot_keys: Vec<Vec<LookupKey>>,
    /// Next never used slot.
    next_index: usize,
    /// Fresh slots are handed out below this index, the free queue supplies
    /// the rest.
    next_limit: usize,
    free: VecDeque<usize>,
}

impl Lookup {
    fn claim(&mut self) -> Option<usize> {
        if self.next_index < self.next_limit {
            let index = self.next_index;
            self.next_index += 1;
            Some(index)
        } else {
            self.free.pop_front()
        }
    }

    fn insert(&mut self, key: LookupKey, index: usize) {
        if self.indices.insert(key.clone(), index).is_none() {
            self.slot_keys[index].push(key);
        }
    }

    fn unmap(&mut self, index: usize) {
        for key in self.slot_keys[index].drain(..) {
            self.indices.remove(&key);
        }
    }
}

/// A bounded, concurrent map from attribute sets to aggregated metric points.
///
/// Each distinct attribute set is aggregated in its own point, up to the
/// configured cardinality limit. Beyond the limit measurements go to an
/// overflow point tagged `otel.metric.overflow = true`, or are dropped when
/// the overflow attribute is disabled. Both cases are counted in
/// [dropped_measurements](Self::dropped_measurements).
///
/// With delta temporality the store can reclaim points that were not updated
/// during a whole collection cycle, so rotating attribute sets keep finding
/// room.
///
/// # Examples
///
/// ```
/// use opentelemetry::KeyValue;
/// use opentelemetry_aggregation::{
///     Aggregation, AggregatorConfig, AggregatorStore, MetricData, Temporality,
/// };
///
/// let config = AggregatorConfig::new(Aggregation::Sum { monotonic: true })
///     .with_temporality(Temporality::Delta);
/// let store = AggregatorStore::<u64>::new(config).unwrap();
///
/// store.update(10, &[KeyValue::new("method", "GET")]);
/// store.update(10, &[KeyValue::new("method", "GET")]);
///
/// let MetricData::Sum(sum) = store.collect() else {
///     unreachable!()
/// };
/// assert_eq!(sum.data_points[0].value, 20);
/// ```
pub struct AggregatorStore<T: Number> {
    kind: PointKind,
    temporality: Temporality,
    cardinality_limit: usize,
    first_index: usize,
    emit_overflow_attribute: bool,
    reclaim: bool,
    filter: AttributeSetFilter,
    points: Box<[MetricPoint<T>]>,
    lookup: RwLock<Lookup>,
    dropped: AtomicU64,
    limit_reached: AtomicBool,
    collect_lock: Mutex<()>,
    start_time: AggregateTimeInitiator,
}

impl<T: Number> AggregatorStore<T> {
    /// Creates a store for `config`, rejecting invalid configurations.
    pub fn new(config: AggregatorConfig) -> MetricResult<Self> {
        config.validate()?;

        let kind = PointKind::new(config.aggregation())?;
        let limit = config.cardinality_limit();
        let first_index = config.reserved_points();
        let emit_overflow_attribute = config.emit_overflow_attribute;
        let reclaim = config.reclaims();

        let points = (0..limit)
            .map(|index| {
                let attributes = if emit_overflow_attribute && index == OVERFLOW_INDEX {
                    overflow_attributes()
                } else {
                    Vec::new()
                };
                MetricPoint::new(&kind, attributes)
            })
            .collect::<MetricResult<Vec<_>>>()?
            .into_boxed_slice();

        // Fresh indices run up to the threshold inclusive, the slots above it
        // start in the free queue and reclaimed slots join them at the back.
        let (next_limit, free) = if reclaim {
            let threshold = (limit * 3 / 4).max(first_index);
            let fresh_end = (threshold + 1).min(limit);
            (fresh_end, (fresh_end..limit).collect())
        } else {
            (limit, VecDeque::new())
        };

        otel_debug!(
            name: "AggregatorStore.Created",
            aggregation = format!("{}", config.aggregation()),
            cardinality_limit = limit as i64,
            reclaim = reclaim
        );

        Ok(AggregatorStore {
            kind,
            temporality: config.temporality(),
            cardinality_limit: limit,
            first_index,
            emit_overflow_attribute,
            reclaim,
            filter: AttributeSetFilter::new(config.filter()),
            points,
            lookup: RwLock::new(Lookup {
                indices: HashMap::default(),
                slot_keys: vec![Vec::new(); limit],
                next_index: first_index,
                next_limit,
                free,
            }),
            dropped: AtomicU64::new(0),
            limit_reached: AtomicBool::new(false),
            collect_lock: Mutex::new(()),
            start_time: AggregateTimeInitiator::default(),
        })
    }

    /// Aggregates `value` into the point of `attributes`.
    ///
    /// Histogram aggregations ignore NaN and infinite values.
    pub fn update(&self, value: T, attributes: &[KeyValue]) {
        if !self.kind.accepts(value) {
            return;
        }

        self.filter.apply(attributes, |filtered| {
            if filtered.is_empty() {
                self.points[NO_ATTRIBUTES_INDEX].update(value);
                return;
            }

            match self.find_or_claim(filtered) {
                Some(index) => {
                    let point = &self.points[index];
                    point.update(value);
                    if self.reclaim {
                        point.unpin();
                    }
                }
                None => self.record_beyond_limit(value),
            }
        })
    }

    /// The index of the point aggregating `attributes`, claiming one if the
    /// set was not seen before.
    ///
    /// Returns `None` when the store is at its cardinality limit. With
    /// reclamation enabled the index is only stable until the next
    /// collection.
    pub fn resolve(&self, attributes: &[KeyValue]) -> Option<usize> {
        self.filter.apply(attributes, |filtered| {
            if filtered.is_empty() {
                return Some(NO_ATTRIBUTES_INDEX);
            }

            let index = self.find_or_claim(filtered)?;
            if self.reclaim {
                self.points[index].unpin();
            }
            Some(index)
        })
    }

    /// Looks up the point of `attributes`, pinning it when reclamation is
    /// enabled.
    fn find_or_claim(&self, attributes: &[KeyValue]) -> Option<usize> {
        let given = Hashed::from_borrowed(attributes);
        {
            let lookup = self.lookup.read().unwrap_or_else(|err| err.into_inner());
            if let Some(index) = self.pin_mapped(&lookup, &given) {
                return Some(index);
            }
        }

        let sorted_key: LookupKey = Hashed::from_owned(canonical_attributes(attributes));
        {
            let lookup = self.lookup.read().unwrap_or_else(|err| err.into_inner());
            if let Some(index) = self.pin_mapped(&lookup, &sorted_key) {
                return Some(index);
            }
        }

        let mut lookup = self.lookup.write().unwrap_or_else(|err| err.into_inner());

        // Recheck again in case another thread already inserted
        if let Some(index) = self.pin_mapped(&lookup, &given) {
            return Some(index);
        }
        if let Some(index) = self.pin_mapped(&lookup, &sorted_key) {
            lookup.insert(given.into_owned(), index);
            return Some(index);
        }

        let index = lookup.claim()?;
        let point = &self.points[index];
        point.reinitialize(sorted_key.to_vec());
        if self.reclaim {
            point.pin();
        }

        if *given != *sorted_key {
            lookup.insert(given.into_owned(), index);
        }
        lookup.insert(sorted_key, index);
        Some(index)
    }

    fn pin_mapped(&self, lookup: &Lookup, key: &Hashed<'_, [KeyValue]>) -> Option<usize> {
        let index = *lookup.indices.get(key)?;
        if self.reclaim && !self.points[index].pin() {
            self.points[index].unpin();
            return None;
        }
        Some(index)
    }

    fn record_beyond_limit(&self, value: T) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        if self.emit_overflow_attribute {
            self.points[OVERFLOW_INDEX].update(value);
        }

        if !self.limit_reached.swap(true, Ordering::Relaxed) {
            otel_warn!(
                name: "AggregatorStore.CardinalityLimitReached",
                message = "Maximum data points for metric stream exceeded. Entry added to overflow. Subsequent overflows to same metric until next collect will not be logged.",
                cardinality_limit = self.cardinality_limit as i64,
                overflow = self.emit_overflow_attribute
            );
        }
    }

    /// Snapshots every active point.
    ///
    /// Delta collections report only the points updated since the previous
    /// collection and reset them. Cumulative collections report every point
    /// that ever received a measurement.
    pub fn collect(&self) -> MetricData<T> {
        let _guard = self
            .collect_lock
            .lock()
            .unwrap_or_else(|err| err.into_inner());

        let output_delta = self.temporality == Temporality::Delta;
        let time = if output_delta {
            self.start_time.delta()
        } else {
            self.start_time.cumulative()
        };
        let mut data = self.empty_data(time);

        // points without data are candidates too, they may be claimed by
        // `resolve` and never updated
        let mut idle = Vec::new();
        for (index, point) in self.points.iter().enumerate() {
            let reclaimable = self.reclaim && index >= self.first_index;
            if !point.is_initialized() {
                if reclaimable {
                    idle.push(index);
                }
                continue;
            }
            if output_delta && !point.is_collect_pending() {
                if reclaimable {
                    idle.push(index);
                }
                continue;
            }
            point.take_snapshot(output_delta).push_into(&mut data);
        }

        if !idle.is_empty() {
            self.reclaim_points(&idle);
        }

        data
    }

    /// Releases mapped points that stayed idle for a whole collection cycle.
    fn reclaim_points(&self, idle: &[usize]) {
        let mut lookup = self.lookup.write().unwrap_or_else(|err| err.into_inner());
        let mut reclaimed = 0_i64;
        for &index in idle {
            // free points are not mapped
            if lookup.slot_keys[index].is_empty() {
                continue;
            }
            let point = &self.points[index];
            if !point.try_retire() {
                continue;
            }
            lookup.unmap(index);
            point.release();
            lookup.free.push_back(index);
            reclaimed += 1;
        }
        drop(lookup);

        if reclaimed > 0 {
            otel_debug!(name: "MetricPoint.Reclaimed", count = reclaimed);
        }
    }

    fn empty_data(&self, time: AggregateTime) -> MetricData<T> {
        match &self.kind {
            PointKind::Sum { monotonic } | PointKind::PrecomputedSum { monotonic } => Sum {
                data_points: Vec::new(),
                start_time: time.start,
                time: time.current,
                temporality: self.temporality,
                is_monotonic: *monotonic,
            }
            .into(),
            PointKind::LastValue => Gauge {
                data_points: Vec::new(),
                start_time: Some(time.start),
                time: time.current,
            }
            .into(),
            PointKind::Histogram { .. } => Histogram {
                data_points: Vec::new(),
                start_time: time.start,
                time: time.current,
                temporality: self.temporality,
            }
            .into(),
            PointKind::ExponentialHistogram { .. } => ExponentialHistogram {
                data_points: Vec::new(),
                start_time: time.start,
                time: time.current,
                temporality: self.temporality,
            }
            .into(),
        }
    }

    /// Number of measurements that did not land in their own point, whether
    /// they went to the overflow point or were dropped.
    pub fn dropped_measurements(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The temporality collections report with.
    pub fn temporality(&self) -> Temporality {
        self.temporality
    }

    /// The maximum number of points, reserved points included.
    pub fn cardinality_limit(&self) -> usize {
        self.cardinality_limit
    }

    /// Number of points currently holding data.
    pub fn len(&self) -> usize {
        self.points.iter().filter(|p| p.is_initialized()).count()
    }

    /// Whether no point holds data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Number> fmt::Debug for AggregatorStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorStore")
            .field("kind", &self.kind)
            .field("temporality", &self.temporality)
            .field("cardinality_limit", &self.cardinality_limit)
            .field("reclaim", &self.reclaim)
            .field("dropped", &self.dropped)
            .finish()
    }
}
