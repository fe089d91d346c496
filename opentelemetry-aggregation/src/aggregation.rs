use std::fmt;

use crate::error::{MetricError, MetricResult};
use crate::internal::{ExplicitBounds, EXPO_MAX_SCALE, EXPO_MIN_SCALE};

/// The way recorded measurements are summarized.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// An aggregation that summarizes a set of measurements as their arithmetic
    /// sum.
    Sum {
        /// Whether the sum only ever increases.
        monotonic: bool,
    },

    /// An aggregation for measurements that are already running totals, such as
    /// observations of an asynchronous counter.
    ///
    /// Each measurement replaces the previous one. Delta collections report the
    /// difference from the value reported by the previous collection.
    PrecomputedSum {
        /// Whether the observed total only ever increases.
        monotonic: bool,
    },

    /// An aggregation that summarizes a set of measurements as the last one made.
    LastValue,

    /// An aggregation that summarizes a set of measurements as a histogram with
    /// explicitly defined buckets.
    ExplicitBucketHistogram {
        /// The increasing bucket boundary values.
        ///
        /// Boundary values define bucket upper bounds. Buckets are exclusive of their
        /// lower boundary and inclusive of their upper bound (except at positive
        /// infinity). A measurement is defined to fall into the lowest-numbered
        /// bucket with a boundary that is greater than or equal to the measurement. As
        /// an example, boundaries defined as:
        ///
        /// vec![0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0,
        /// 1000.0, 2500.0, 5000.0, 7500.0, 10000.0];
        ///
        /// Will define these buckets:
        ///
        /// (-∞, 0], (0, 5.0], (5.0, 10.0], (10.0, 25.0], (25.0, 50.0], (50.0,
        ///  75.0], (75.0, 100.0], (100.0, 250.0], (250.0, 500.0], (500.0,
        ///  750.0], (750.0, 1000.0], (1000.0, 2500.0], (2500.0, 5000.0],
        ///  (5000.0, 7500.0], (7500.0, 10000.0], (10000.0, +∞)
        ///
        /// An empty list produces a histogram that tracks only count, sum, min
        /// and max.
        boundaries: Vec<f64>,

        /// Indicates whether to record the min and max of the distribution.
        ///
        /// Recording these values for cumulative data is expected to have little
        /// value, they will represent the entire life of the instrument instead of
        /// just the current collection cycle.
        record_min_max: bool,
    },

    /// An aggregation that summarizes a set of measurements as a histogram with
    /// bucket widths that grow exponentially.
    Base2ExponentialHistogram {
        /// The maximum number of buckets to use for each of the positive and
        /// negative ranges.
        max_size: u32,

        /// The maximum resolution scale to use for the histogram.
        ///
        /// The maximum value is `20`, in which case the maximum number of buckets
        /// that can fit within the range of a signed 32-bit integer index could be
        /// used.
        ///
        /// The minimum value is `-10` in which case only a handful of buckets
        /// cover the whole `f64` range.
        max_scale: i8,

        /// Indicates whether to record the min and max of the distribution.
        record_min_max: bool,
    },
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Sum { .. } => "Sum",
            Aggregation::PrecomputedSum { .. } => "PrecomputedSum",
            Aggregation::LastValue => "LastValue",
            Aggregation::ExplicitBucketHistogram { .. } => "ExplicitBucketHistogram",
            Aggregation::Base2ExponentialHistogram { .. } => "Base2ExponentialHistogram",
        };

        f.write_str(name)
    }
}

impl Aggregation {
    /// The default explicit histogram boundaries.
    pub const DEFAULT_BOUNDARIES: [f64; 15] = [
        0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0,
        7500.0, 10000.0,
    ];

    /// An explicit bucket histogram with the default boundaries, recording
    /// min and max.
    pub fn default_histogram() -> Self {
        Aggregation::ExplicitBucketHistogram {
            boundaries: Self::DEFAULT_BOUNDARIES.to_vec(),
            record_min_max: true,
        }
    }

    /// A base-2 exponential histogram with 160 buckets per sign starting at
    /// the finest scale, recording min and max.
    pub fn default_exponential_histogram() -> Self {
        Aggregation::Base2ExponentialHistogram {
            max_size: 160,
            max_scale: EXPO_MAX_SCALE,
            record_min_max: true,
        }
    }

    /// Validate that this aggregation has correct configuration
    pub fn validate(&self) -> MetricResult<()> {
        match self {
            Aggregation::Sum { .. } => Ok(()),
            Aggregation::PrecomputedSum { .. } => Ok(()),
            Aggregation::LastValue => Ok(()),
            Aggregation::ExplicitBucketHistogram { boundaries, .. } => {
                ExplicitBounds::new(boundaries.clone()).map_err(|err| {
                    MetricError::Config(format!(
                        "aggregation: explicit bucket histogram: {err}: {boundaries:?}"
                    ))
                })?;

                Ok(())
            }
            Aggregation::Base2ExponentialHistogram {
                max_size,
                max_scale,
                ..
            } => {
                if *max_scale > EXPO_MAX_SCALE {
                    return Err(MetricError::Config(format!(
                        "aggregation: exponential histogram: max scale ({max_scale}) is greater than {EXPO_MAX_SCALE}",
                    )));
                }
                if *max_scale < EXPO_MIN_SCALE {
                    return Err(MetricError::Config(format!(
                        "aggregation: exponential histogram: max scale ({max_scale}) is less than {EXPO_MIN_SCALE}",
                    )));
                }
                if *max_size < 2 {
                    return Err(MetricError::Config(format!(
                        "aggregation: exponential histogram: max size ({max_size}) is less than 2",
                    )));
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Aggregation::Sum { monotonic: true })]
    #[case(Aggregation::PrecomputedSum { monotonic: false })]
    #[case(Aggregation::LastValue)]
    #[case(Aggregation::default_histogram())]
    #[case(Aggregation::ExplicitBucketHistogram { boundaries: vec![], record_min_max: false })]
    #[case(Aggregation::default_exponential_histogram())]
    #[case(Aggregation::Base2ExponentialHistogram { max_size: 2, max_scale: -10, record_min_max: false })]
    fn valid_aggregations(#[case] aggregation: Aggregation) {
        assert!(aggregation.validate().is_ok(), "{aggregation}");
    }

    #[rstest]
    #[case(Aggregation::ExplicitBucketHistogram { boundaries: vec![1.0, 0.0], record_min_max: true })]
    #[case(Aggregation::ExplicitBucketHistogram { boundaries: vec![f64::NAN], record_min_max: true })]
    #[case(Aggregation::Base2ExponentialHistogram { max_size: 160, max_scale: 21, record_min_max: true })]
    #[case(Aggregation::Base2ExponentialHistogram { max_size: 160, max_scale: -11, record_min_max: true })]
    #[case(Aggregation::Base2ExponentialHistogram { max_size: 1, max_scale: 20, record_min_max: true })]
    fn invalid_aggregations(#[case] aggregation: Aggregation) {
        assert!(matches!(
            aggregation.validate(),
            Err(MetricError::Config(_))
        ));
    }

    #[test]
    fn display_names_the_kind() {
        assert_eq!(Aggregation::LastValue.to_string(), "LastValue");
        assert_eq!(
            Aggregation::PrecomputedSum { monotonic: true }.to_string(),
            "PrecomputedSum"
        );
    }
}
