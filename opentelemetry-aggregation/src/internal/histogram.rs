use opentelemetry::KeyValue;

use crate::{
    data::HistogramDataPoint,
    error::{MetricError, MetricResult},
};

use super::Number;

/// Boundary counts at or above this use a binary search.
const BINARY_SEARCH_THRESHOLD: usize = 50;

/// Validated, strictly ascending histogram boundaries.
///
/// Buckets are right-inclusive: bucket `i` holds values `v` with
/// `bounds[i - 1] < v <= bounds[i]`, and the last, implicit bucket holds
/// everything above the final boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitBounds {
    bounds: Vec<f64>,
}

impl ExplicitBounds {
    /// Validates `boundaries`.
    ///
    /// They must be strictly ascending and free of NaN. Negative infinity is
    /// accepted only as the first element and positive infinity only as the
    /// last. Both are dropped since the outer buckets already cover them.
    pub fn new(boundaries: Vec<f64>) -> MetricResult<Self> {
        if let Some(i) = boundaries.iter().position(|b| b.is_nan()) {
            return Err(MetricError::Config(format!(
                "histogram boundary {i} is NaN"
            )));
        }
        if let Some(w) = boundaries.windows(2).position(|w| w[0] >= w[1]) {
            return Err(MetricError::Config(format!(
                "histogram boundaries must be strictly ascending, {} >= {} at {}",
                boundaries[w],
                boundaries[w + 1],
                w + 1
            )));
        }

        let last = boundaries.len().saturating_sub(1);
        for (i, b) in boundaries.iter().enumerate() {
            if *b == f64::NEG_INFINITY && i != 0 {
                return Err(MetricError::Config(
                    "negative infinity is only allowed as the first histogram boundary".into(),
                ));
            }
            if *b == f64::INFINITY && i != last {
                return Err(MetricError::Config(
                    "positive infinity is only allowed as the last histogram boundary".into(),
                ));
            }
        }

        let bounds = boundaries.into_iter().filter(|b| b.is_finite()).collect();
        Ok(ExplicitBounds { bounds })
    }

    /// The finite boundaries.
    pub fn as_slice(&self) -> &[f64] {
        &self.bounds
    }

    /// The number of buckets, one more than the number of boundaries.
    pub fn bucket_count(&self) -> usize {
        self.bounds.len() + 1
    }

    /// The index of the bucket `value` belongs to.
    pub fn find_bucket(&self, value: f64) -> usize {
        if self.bounds.len() >= BINARY_SEARCH_THRESHOLD {
            self.bounds.partition_point(|b| *b < value)
        } else {
            self.find_bucket_linear(value)
        }
    }

    fn find_bucket_linear(&self, value: f64) -> usize {
        self.bounds
            .iter()
            .position(|b| value <= *b)
            .unwrap_or(self.bounds.len())
    }
}

/// The running state of one explicit bucket histogram point.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct HistogramBuckets<T> {
    pub(crate) counts: Vec<u64>,
    pub(crate) count: u64,
    pub(crate) total: T,
    pub(crate) min: T,
    pub(crate) max: T,
}

impl<T: Number> HistogramBuckets<T> {
    /// returns buckets with `n` bins.
    pub(crate) fn new(n: usize) -> HistogramBuckets<T> {
        HistogramBuckets {
            counts: vec![0; n],
            min: T::max(),
            max: T::min(),
            ..Default::default()
        }
    }

    pub(crate) fn sum(&mut self, value: T) {
        self.total += value;
    }

    pub(crate) fn bin(&mut self, idx: usize, value: T) {
        self.counts[idx] += 1;
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value
        }
    }

    pub(crate) fn snapshot(
        &self,
        attributes: Vec<KeyValue>,
        bounds: &ExplicitBounds,
        record_min_max: bool,
    ) -> HistogramDataPoint<T> {
        let has_min_max = record_min_max && self.count > 0;
        HistogramDataPoint {
            attributes,
            count: self.count,
            bounds: bounds.as_slice().to_vec(),
            bucket_counts: self.counts.clone(),
            min: has_min_max.then_some(self.min),
            max: has_min_max.then_some(self.max),
            sum: self.total,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.count = 0;
        self.total = T::default();
        self.min = T::max();
        self.max = T::min();
    }
}
