use std::f64::consts::{LN_2, LOG2_E};

use opentelemetry::KeyValue;

use crate::{
    data::{ExponentialBucket, ExponentialHistogramDataPoint},
    error::{MetricError, MetricResult},
};

use super::{CircularBufferBuckets, Number};

/// The finest supported resolution.
pub const EXPO_MAX_SCALE: i8 = 20;
/// The coarsest configurable resolution, every `f64` maps to one of three buckets.
pub const EXPO_MIN_SCALE: i8 = -10;
/// The coarsest scale rescaling may reach. Every `f64` maps to bucket -1 or 0,
/// so any `max_size >= 2` holds all values.
const RESCALE_MIN_SCALE: i8 = EXPO_MIN_SCALE - 1;

const SIGNIFICAND_WIDTH: u32 = 52;
const SIGNIFICAND_MASK: u64 = (1 << SIGNIFICAND_WIDTH) - 1;
const EXPONENT_MASK: u64 = 0x7ff << SIGNIFICAND_WIDTH;
const EXPONENT_BIAS: i64 = 1023;
/// Exponent of the lowest set significand bit of a subnormal, offset by the
/// leading zeros of a 64-bit integer.
const SUBNORMAL_EXPONENT_BASE: i64 = -1011;
/// Subnormals are multiplied by `2^SUBNORMAL_LIFT` before taking the log.
const SUBNORMAL_LIFT: i32 = 64;
const SUBNORMAL_LIFT_FACTOR: f64 = 18446744073709551616.0;

/// Maps positive finite values to the index of the exponential bucket that
/// holds them.
///
/// Bucket `i` covers `(base^i, base^(i+1)]` where `base = 2^(2^-scale)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketIndexMapper {
    scale: i8,
    scaling_factor: f64,
}

impl BucketIndexMapper {
    /// Creates a mapper for a scale in `[-10, 20]`.
    pub fn new(scale: i8) -> MetricResult<Self> {
        if !(EXPO_MIN_SCALE..=EXPO_MAX_SCALE).contains(&scale) {
            return Err(MetricError::Config(format!(
                "scale {scale} is outside [{EXPO_MIN_SCALE}, {EXPO_MAX_SCALE}]"
            )));
        }
        Ok(Self::with_scale(scale))
    }

    fn with_scale(scale: i8) -> Self {
        BucketIndexMapper {
            scale,
            scaling_factor: LOG2_E * 2f64.powi(scale as i32),
        }
    }

    /// The scale this mapper was created with.
    pub fn scale(&self) -> i8 {
        self.scale
    }

    /// The index of the bucket containing `value`.
    ///
    /// `value` must be finite and strictly positive, zero, NaN and infinities
    /// are handled by the caller.
    ///
    /// For positive scales a value within a few ULPs of a bucket boundary may
    /// land in the neighbouring bucket.
    pub fn map_to_index(&self, value: f64) -> i32 {
        let (exp, is_power_of_two) = decompose(value);

        if self.scale <= 0 {
            let exp = if is_power_of_two { exp - 1 } else { exp };
            return (exp >> -self.scale) as i32;
        }

        if is_power_of_two {
            return ((exp << self.scale) - 1) as i32;
        }

        // Boundaries below the normal range are rounded to the subnormal grid,
        // map the lifted value and shift the index back by whole powers of two.
        if value < f64::MIN_POSITIVE {
            return self.map_to_index(value * SUBNORMAL_LIFT_FACTOR)
                - (SUBNORMAL_LIFT << self.scale);
        }

        // ln/multiply can land one bucket off near a boundary, a single
        // comparison against the computed boundaries settles it.
        let mut index = (value.ln() * self.scaling_factor).floor() as i64;
        if value <= self.lower_boundary_of(index) {
            index -= 1;
        } else if value > self.lower_boundary_of(index + 1) {
            index += 1;
        }
        index as i32
    }

    /// The exclusive lower boundary of bucket `index`, `base^index`.
    pub fn lower_boundary(&self, index: i32) -> f64 {
        self.lower_boundary_of(index as i64)
    }

    fn lower_boundary_of(&self, index: i64) -> f64 {
        if self.scale <= 0 {
            let shift = -self.scale as u32;
            return pow2(index.saturating_mul(1 << shift));
        }
        let scale = self.scale as u32;
        let mask = (1i64 << scale) - 1;
        let whole = index >> scale;
        let fraction = (index & mask) as f64 * LN_2 / (1i64 << scale) as f64;
        pow2(whole) * fraction.exp()
    }
}

/// Splits a positive finite value into `floor(log2(value))` and whether the
/// value is an exact power of two.
fn decompose(value: f64) -> (i64, bool) {
    let bits = value.to_bits();
    let significand = bits & SIGNIFICAND_MASK;
    let biased = ((bits & EXPONENT_MASK) >> SIGNIFICAND_WIDTH) as i64;

    if biased == 0 {
        // subnormal, the leading significand bit carries the exponent
        let exp = SUBNORMAL_EXPONENT_BASE - significand.leading_zeros() as i64;
        return (exp, significand.is_power_of_two());
    }

    (biased - EXPONENT_BIAS, significand == 0)
}

/// `2^exp` as an `f64`, saturating to infinity and flushing to zero.
fn pow2(exp: i64) -> f64 {
    if exp > EXPONENT_BIAS {
        f64::INFINITY
    } else if exp >= 1 - EXPONENT_BIAS {
        f64::from_bits(((exp + EXPONENT_BIAS) as u64) << SIGNIFICAND_WIDTH)
    } else if exp >= 1 - EXPONENT_BIAS - SIGNIFICAND_WIDTH as i64 {
        f64::from_bits(1u64 << (exp + EXPONENT_BIAS + SIGNIFICAND_WIDTH as i64 - 1))
    } else {
        0.0
    }
}

/// The running state of one exponential histogram point.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExpoHistogramDataPoint<T> {
    pub(crate) count: usize,
    pub(crate) min: T,
    pub(crate) max: T,
    pub(crate) sum: T,

    record_min_max: bool,
    max_scale: i8,

    mapper: BucketIndexMapper,
    pub(crate) pos_buckets: CircularBufferBuckets,
    pub(crate) neg_buckets: CircularBufferBuckets,
    pub(crate) zero_count: u64,
}

impl<T: Number> ExpoHistogramDataPoint<T> {
    pub(crate) fn new(max_size: usize, max_scale: i8, record_min_max: bool) -> MetricResult<Self> {
        if max_size < 2 {
            return Err(MetricError::Config(format!(
                "exponential histogram max_size must be at least 2, got {max_size}"
            )));
        }
        Ok(ExpoHistogramDataPoint {
            count: 0,
            min: T::max(),
            max: T::min(),
            sum: T::default(),
            record_min_max,
            max_scale,
            mapper: BucketIndexMapper::new(max_scale)?,
            pos_buckets: CircularBufferBuckets::new(max_size)?,
            neg_buckets: CircularBufferBuckets::new(max_size)?,
            zero_count: 0,
        })
    }

    pub(crate) fn scale(&self) -> i8 {
        self.mapper.scale()
    }

    /// Adds a new measurement to the histogram.
    ///
    /// It will rescale the buckets if needed.
    pub(crate) fn record(&mut self, v: T) {
        let abs_v = v.into_float().abs();
        // Ignore NaN and infinity.
        if !abs_v.is_finite() {
            return;
        }

        self.count += 1;
        if self.record_min_max {
            if v < self.min {
                self.min = v;
            }
            if v > self.max {
                self.max = v;
            }
        }
        self.sum += v;

        if abs_v == 0.0 {
            self.zero_count += 1;
            return;
        }

        let index = self.mapper.map_to_index(abs_v);
        let is_negative = v < T::default();

        let levels = self.buckets_mut(is_negative).try_increment(index, 1);
        if levels == 0 {
            return;
        }

        debug_assert!(
            self.scale() - levels as i8 >= RESCALE_MIN_SCALE,
            "two buckets hold every value at the coarsest scale"
        );
        self.downscale(levels);
        let missing = self.buckets_mut(is_negative).try_increment(index >> levels, 1);
        debug_assert_eq!(missing, 0, "rescaling should guarantee the value fits");
    }

    fn buckets_mut(&mut self, is_negative: bool) -> &mut CircularBufferBuckets {
        if is_negative {
            &mut self.neg_buckets
        } else {
            &mut self.pos_buckets
        }
    }

    fn downscale(&mut self, levels: u32) {
        if levels == 0 {
            return;
        }
        self.pos_buckets.scale_down(levels);
        self.neg_buckets.scale_down(levels);
        self.mapper = BucketIndexMapper::with_scale(self.scale() - levels as i8);
    }

    /// Copies the current state into an exported data point.
    pub(crate) fn snapshot(&self, attributes: Vec<KeyValue>) -> ExponentialHistogramDataPoint<T> {
        let has_min_max = self.record_min_max && self.count > 0;
        ExponentialHistogramDataPoint {
            attributes,
            count: self.count,
            min: has_min_max.then_some(self.min),
            max: has_min_max.then_some(self.max),
            sum: self.sum,
            scale: self.scale(),
            zero_count: self.zero_count,
            positive_bucket: ExponentialBucket {
                offset: self.pos_buckets.offset(),
                counts: self.pos_buckets.iter().collect(),
            },
            negative_bucket: ExponentialBucket {
                offset: self.neg_buckets.offset(),
                counts: self.neg_buckets.iter().collect(),
            },
        }
    }

    /// Clears all recorded values and restores the configured maximum scale.
    pub(crate) fn reset(&mut self) {
        self.count = 0;
        self.min = T::max();
        self.max = T::min();
        self.sum = T::default();
        self.zero_count = 0;
        self.pos_buckets.reset();
        self.neg_buckets.reset();
        self.mapper = BucketIndexMapper::with_scale(self.max_scale);
    }
}
