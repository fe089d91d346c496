use std::sync::{
    atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering},
    Arc, Mutex,
};

use opentelemetry::KeyValue;

use crate::{
    data::{
        ExponentialHistogramDataPoint, GaugeDataPoint, HistogramDataPoint, MetricData,
        SumDataPoint,
    },
    error::MetricResult,
    Aggregation,
};

use super::{
    exponential_histogram::ExpoHistogramDataPoint,
    histogram::{ExplicitBounds, HistogramBuckets},
    last_value::Assign,
    precomputed_sum::Observed,
    sum::Increment,
    Number,
};

const NO_COLLECT_PENDING: u8 = 0;
const COLLECT_PENDING: u8 = 1;

/// Marks a point whose reference count was claimed by the collector for
/// removal. Producers that observe a negative count must not touch it.
const RETIRED: i32 = i32::MIN;

/// What every point of a store aggregates, resolved once from the
/// [Aggregation].
#[derive(Debug, Clone)]
pub(crate) enum PointKind {
    Sum {
        monotonic: bool,
    },
    PrecomputedSum {
        monotonic: bool,
    },
    LastValue,
    Histogram {
        bounds: Arc<ExplicitBounds>,
        record_min_max: bool,
    },
    ExponentialHistogram {
        max_size: usize,
        max_scale: i8,
        record_min_max: bool,
    },
}

impl PointKind {
    pub(crate) fn new(aggregation: &Aggregation) -> MetricResult<Self> {
        Ok(match aggregation {
            Aggregation::Sum { monotonic } => PointKind::Sum {
                monotonic: *monotonic,
            },
            Aggregation::PrecomputedSum { monotonic } => PointKind::PrecomputedSum {
                monotonic: *monotonic,
            },
            Aggregation::LastValue => PointKind::LastValue,
            Aggregation::ExplicitBucketHistogram {
                boundaries,
                record_min_max,
            } => PointKind::Histogram {
                bounds: Arc::new(ExplicitBounds::new(boundaries.clone())?),
                record_min_max: *record_min_max,
            },
            Aggregation::Base2ExponentialHistogram {
                max_size,
                max_scale,
                record_min_max,
            } => PointKind::ExponentialHistogram {
                max_size: *max_size as usize,
                max_scale: *max_scale,
                record_min_max: *record_min_max,
            },
        })
    }

    /// Histogram kinds ignore NaN and infinities.
    pub(crate) fn accepts<T: Number>(&self, value: T) -> bool {
        match self {
            PointKind::Histogram { .. } | PointKind::ExponentialHistogram { .. } => {
                value.into_float().is_finite()
            }
            _ => true,
        }
    }
}

enum PointAggregation<T: Number> {
    Sum(Increment<T>),
    PrecomputedSum(Observed<T>),
    LastValue(Assign<T>),
    Histogram {
        bounds: Arc<ExplicitBounds>,
        record_min_max: bool,
        buckets: Mutex<HistogramBuckets<T>>,
    },
    ExponentialHistogram(Mutex<ExpoHistogramDataPoint<T>>),
}

/// A snapshot of one point, ready to be added to a collection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PointSnapshot<T> {
    Sum(SumDataPoint<T>),
    Gauge(GaugeDataPoint<T>),
    Histogram(HistogramDataPoint<T>),
    ExponentialHistogram(ExponentialHistogramDataPoint<T>),
}

impl<T> PointSnapshot<T> {
    /// Appends the snapshot to `data` when both have the same shape.
    pub(crate) fn push_into(self, data: &mut MetricData<T>) {
        match (self, data) {
            (PointSnapshot::Sum(point), MetricData::Sum(sum)) => sum.data_points.push(point),
            (PointSnapshot::Gauge(point), MetricData::Gauge(gauge)) => {
                gauge.data_points.push(point)
            }
            (PointSnapshot::Histogram(point), MetricData::Histogram(histogram)) => {
                histogram.data_points.push(point)
            }
            (
                PointSnapshot::ExponentialHistogram(point),
                MetricData::ExponentialHistogram(histogram),
            ) => histogram.data_points.push(point),
            _ => {}
        }
    }
}

/// One slot of an [AggregatorStore](crate::AggregatorStore).
///
/// A point is reused for many attribute sets over the life of a store. It is
/// `initialized` once it received a measurement for its current attributes
/// and stops being so when it is reclaimed.
pub(crate) struct MetricPoint<T: Number> {
    attributes: Mutex<Vec<KeyValue>>,
    initialized: AtomicBool,
    status: AtomicU8,
    ref_count: AtomicI32,
    aggregation: PointAggregation<T>,
}

impl<T: Number> MetricPoint<T> {
    pub(crate) fn new(kind: &PointKind, attributes: Vec<KeyValue>) -> MetricResult<Self> {
        let aggregation = match kind {
            PointKind::Sum { .. } => PointAggregation::Sum(Increment::new()),
            PointKind::PrecomputedSum { monotonic } => {
                PointAggregation::PrecomputedSum(Observed::new(*monotonic))
            }
            PointKind::LastValue => PointAggregation::LastValue(Assign::new()),
            PointKind::Histogram {
                bounds,
                record_min_max,
            } => PointAggregation::Histogram {
                bounds: Arc::clone(bounds),
                record_min_max: *record_min_max,
                buckets: Mutex::new(HistogramBuckets::new(bounds.bucket_count())),
            },
            PointKind::ExponentialHistogram {
                max_size,
                max_scale,
                record_min_max,
            } => PointAggregation::ExponentialHistogram(Mutex::new(ExpoHistogramDataPoint::new(
                *max_size,
                *max_scale,
                *record_min_max,
            )?)),
        };

        Ok(MetricPoint {
            attributes: Mutex::new(attributes),
            initialized: AtomicBool::new(false),
            status: AtomicU8::new(NO_COLLECT_PENDING),
            ref_count: AtomicI32::new(0),
            aggregation,
        })
    }

    /// Aggregates `value` and flags the point for the next collection.
    pub(crate) fn update(&self, value: T) {
        match &self.aggregation {
            PointAggregation::Sum(sum) => sum.update(value),
            PointAggregation::PrecomputedSum(sum) => sum.update(value),
            PointAggregation::LastValue(gauge) => gauge.update(value),
            PointAggregation::Histogram {
                bounds, buckets, ..
            } => {
                let f = value.into_float();
                if !f.is_finite() {
                    return;
                }
                let index = bounds.find_bucket(f);
                let mut buckets = buckets.lock().unwrap_or_else(|err| err.into_inner());
                buckets.bin(index, value);
                buckets.sum(value);
                self.status.store(COLLECT_PENDING, Ordering::Release);
            }
            PointAggregation::ExponentialHistogram(histogram) => {
                if !value.into_float().is_finite() {
                    return;
                }
                let mut histogram = histogram.lock().unwrap_or_else(|err| err.into_inner());
                histogram.record(value);
                self.status.store(COLLECT_PENDING, Ordering::Release);
            }
        }

        // scalar kinds publish after the atomic update, histograms did so
        // while holding their lock
        self.status.store(COLLECT_PENDING, Ordering::Release);
        if !self.initialized.load(Ordering::Relaxed) {
            self.initialized.store(true, Ordering::Release);
        }
    }

    /// Copies the aggregate out of the point, resetting it when reporting
    /// deltas.
    pub(crate) fn take_snapshot(&self, output_delta: bool) -> PointSnapshot<T> {
        let attributes = self
            .attributes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone();

        match &self.aggregation {
            PointAggregation::Sum(sum) => {
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                PointSnapshot::Sum(SumDataPoint {
                    attributes,
                    value: sum.take(output_delta),
                })
            }
            PointAggregation::PrecomputedSum(sum) => {
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                PointSnapshot::Sum(SumDataPoint {
                    attributes,
                    value: sum.take(output_delta),
                })
            }
            PointAggregation::LastValue(gauge) => {
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                PointSnapshot::Gauge(GaugeDataPoint {
                    attributes,
                    value: gauge.get(),
                })
            }
            PointAggregation::Histogram {
                bounds,
                record_min_max,
                buckets,
            } => {
                let mut buckets = buckets.lock().unwrap_or_else(|err| err.into_inner());
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                let point = buckets.snapshot(attributes, bounds, *record_min_max);
                if output_delta {
                    buckets.reset();
                }
                PointSnapshot::Histogram(point)
            }
            PointAggregation::ExponentialHistogram(histogram) => {
                let mut histogram = histogram.lock().unwrap_or_else(|err| err.into_inner());
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                let point = histogram.snapshot(attributes);
                if output_delta {
                    histogram.reset();
                }
                PointSnapshot::ExponentialHistogram(point)
            }
        }
    }

    /// Whether the point holds data for its current attributes.
    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether the point was updated since the last snapshot.
    pub(crate) fn is_collect_pending(&self) -> bool {
        self.status.load(Ordering::Acquire) == COLLECT_PENDING
    }

    /// Prepares the point for a new attribute set.
    ///
    /// Must only be called while no producer can reach the point.
    pub(crate) fn reinitialize(&self, attributes: Vec<KeyValue>) {
        match &self.aggregation {
            PointAggregation::Sum(sum) => sum.clear(),
            PointAggregation::PrecomputedSum(sum) => sum.clear(),
            PointAggregation::LastValue(gauge) => gauge.clear(),
            PointAggregation::Histogram { buckets, .. } => buckets
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .reset(),
            PointAggregation::ExponentialHistogram(histogram) => histogram
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .reset(),
        }
        *self.attributes.lock().unwrap_or_else(|err| err.into_inner()) = attributes;
        self.status.store(NO_COLLECT_PENDING, Ordering::Release);
        self.initialized.store(false, Ordering::Release);
        self.ref_count.store(0, Ordering::Release);
    }

    /// Keeps the collector from reclaiming the point until [unpin](Self::unpin).
    ///
    /// Returns `false` when the point was already retired.
    pub(crate) fn pin(&self) -> bool {
        self.ref_count.fetch_add(1, Ordering::AcqRel) >= 0
    }

    pub(crate) fn unpin(&self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Claims an idle, unpinned point for removal.
    ///
    /// Callers must hold the lookup write lock so that no producer can pin
    /// the point meanwhile.
    pub(crate) fn try_retire(&self) -> bool {
        if self
            .ref_count
            .compare_exchange(0, RETIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // the exchange observed the last unpin, so any update before it is
        // visible here
        if self.is_collect_pending() {
            self.ref_count.store(0, Ordering::Release);
            return false;
        }
        true
    }

    /// Finishes removal of a retired point, it holds no attributes until it is
    /// reinitialized.
    pub(crate) fn release(&self) {
        self.initialized.store(false, Ordering::Release);
        self.attributes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::data::{ExponentialBucket, Sum, Temporality};

    fn point<T: Number>(aggregation: Aggregation) -> MetricPoint<T> {
        let kind = PointKind::new(&aggregation).unwrap();
        MetricPoint::new(&kind, vec![KeyValue::new("key", "value")]).unwrap()
    }

    fn sum_value<T: Number>(snapshot: PointSnapshot<T>) -> T {
        match snapshot {
            PointSnapshot::Sum(point) => point.value,
            other => panic!("expected a sum, got {other:?}"),
        }
    }

    #[test]
    fn sum_delta_vs_cumulative() {
        let delta = point::<u64>(Aggregation::Sum { monotonic: true });
        delta.update(10);
        delta.update(10);
        assert_eq!(sum_value(delta.take_snapshot(true)), 20);
        delta.update(5);
        assert_eq!(sum_value(delta.take_snapshot(true)), 5);

        let cumulative = point::<u64>(Aggregation::Sum { monotonic: true });
        cumulative.update(10);
        cumulative.update(10);
        assert_eq!(sum_value(cumulative.take_snapshot(false)), 20);
        cumulative.update(5);
        assert_eq!(sum_value(cumulative.take_snapshot(false)), 25);
    }

    #[test]
    fn status_follows_update_and_snapshot() {
        let p = point::<i64>(Aggregation::LastValue);
        assert!(!p.is_initialized());
        assert!(!p.is_collect_pending());

        p.update(3);
        assert!(p.is_initialized());
        assert!(p.is_collect_pending());

        let snapshot = p.take_snapshot(true);
        assert_eq!(
            snapshot,
            PointSnapshot::Gauge(GaugeDataPoint {
                attributes: vec![KeyValue::new("key", "value")],
                value: 3
            })
        );
        assert!(!p.is_collect_pending());
    }

    #[test]
    fn histogram_ignores_non_finite_values() {
        let p = point::<f64>(Aggregation::ExplicitBucketHistogram {
            boundaries: vec![10.0, 20.0],
            record_min_max: true,
        });
        p.update(f64::NAN);
        p.update(f64::INFINITY);
        assert!(!p.is_initialized());
        assert!(!p.is_collect_pending());

        p.update(15.0);
        match p.take_snapshot(true) {
            PointSnapshot::Histogram(h) => {
                assert_eq!(h.count, 1);
                assert_eq!(h.bucket_counts, vec![0, 1, 0]);
                assert_eq!(h.bounds, vec![10.0, 20.0]);
                assert_eq!(h.min, Some(15.0));
            }
            other => panic!("expected a histogram, got {other:?}"),
        }

        match p.take_snapshot(true) {
            PointSnapshot::Histogram(h) => {
                assert_eq!(h.count, 0);
                assert_eq!(h.bucket_counts, vec![0, 0, 0]);
                assert_eq!(h.min, None);
            }
            other => panic!("expected a histogram, got {other:?}"),
        }
    }

    #[test]
    fn exponential_histogram_delta_restores_scale() {
        let p = point::<f64>(Aggregation::Base2ExponentialHistogram {
            max_size: 4,
            max_scale: 20,
            record_min_max: true,
        });
        for v in [1.0, 2.0, 4.0] {
            p.update(v);
        }

        match p.take_snapshot(true) {
            PointSnapshot::ExponentialHistogram(h) => {
                assert_eq!(h.scale, 0);
                assert_eq!(
                    h.positive_bucket,
                    ExponentialBucket {
                        offset: -1,
                        counts: vec![1, 1, 1]
                    }
                );
            }
            other => panic!("expected an exponential histogram, got {other:?}"),
        }

        p.update(1.5);
        match p.take_snapshot(false) {
            PointSnapshot::ExponentialHistogram(h) => {
                assert_eq!(h.count, 1);
                assert_eq!(h.scale, 20);
            }
            other => panic!("expected an exponential histogram, got {other:?}"),
        }
    }

    #[test]
    fn reinitialize_clears_state() {
        let p = point::<i64>(Aggregation::Sum { monotonic: false });
        p.update(42);
        p.reinitialize(vec![KeyValue::new("other", 1)]);

        assert!(!p.is_initialized());
        assert!(!p.is_collect_pending());
        match p.take_snapshot(false) {
            PointSnapshot::Sum(point) => {
                assert_eq!(point.value, 0);
                assert_eq!(point.attributes, vec![KeyValue::new("other", 1)]);
            }
            other => panic!("expected a sum, got {other:?}"),
        }
    }

    #[test]
    fn pinned_point_cannot_be_retired() {
        let p = point::<u64>(Aggregation::Sum { monotonic: true });
        p.update(1);
        p.take_snapshot(true);

        assert!(p.pin());
        assert!(!p.try_retire());
        p.unpin();

        assert!(p.try_retire());
        assert!(!p.pin());
        p.release();
        assert!(!p.is_initialized());
    }

    #[test]
    fn pending_point_cannot_be_retired() {
        let p = point::<u64>(Aggregation::Sum { monotonic: true });
        p.update(1);
        assert!(!p.try_retire());
    }

    #[test]
    fn snapshot_pushes_into_matching_collection() {
        let now = std::time::SystemTime::now();
        let mut data: MetricData<u64> = Sum {
            data_points: vec![],
            start_time: now,
            time: now,
            temporality: Temporality::Delta,
            is_monotonic: true,
        }
        .into();

        let p = point::<u64>(Aggregation::Sum { monotonic: true });
        p.update(7);
        p.take_snapshot(true).push_into(&mut data);
        assert_eq!(data.len(), 1);

        // mismatched kinds are ignored
        PointSnapshot::Gauge(GaugeDataPoint {
            attributes: vec![],
            value: 1,
        })
        .push_into(&mut data);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let p = Arc::new(point::<u64>(Aggregation::Sum { monotonic: true }));
        let handles = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        p.update(1);
                    }
                })
            })
            .collect::<Vec<_>>();

        let mut total = 0;
        for _ in 0..100 {
            total += sum_value(p.take_snapshot(true));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        total += sum_value(p.take_snapshot(true));

        assert_eq!(total, 40_000);
    }
}
