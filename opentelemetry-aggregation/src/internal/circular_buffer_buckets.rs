use crate::error::{MetricError, MetricResult};

/// A fixed-capacity window of counters addressed by signed bucket indices.
///
/// The occupied indices always form the contiguous range `[begin, end]`, whose
/// width never exceeds the capacity. Index `i` lives in physical slot
/// `i.rem_euclid(capacity)`, so moving the window never relocates counters.
/// Slots outside the window are always zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CircularBufferBuckets {
    counts: Vec<u64>,
    begin: i32,
    end: i32,
    occupied: bool,
    scratch: Vec<u64>,
}

impl CircularBufferBuckets {
    /// Creates an empty window able to hold `capacity` adjacent indices.
    pub fn new(capacity: usize) -> MetricResult<Self> {
        if capacity == 0 {
            return Err(MetricError::Config(
                "bucket capacity must be at least 1".into(),
            ));
        }

        Ok(CircularBufferBuckets {
            counts: vec![0; capacity],
            begin: 0,
            end: 0,
            occupied: false,
            scratch: Vec::new(),
        })
    }

    /// The maximum number of adjacent indices the window can hold.
    pub fn capacity(&self) -> usize {
        self.counts.len()
    }

    /// The lowest occupied index, `0` when empty.
    pub fn offset(&self) -> i32 {
        self.begin
    }

    /// The width of the occupied range.
    pub fn size(&self) -> usize {
        if !self.occupied {
            return 0;
        }
        (self.end as i64 - self.begin as i64 + 1) as usize
    }

    /// The count stored at `index`, `0` for any index outside the window.
    pub fn get(&self, index: i32) -> u64 {
        if !self.occupied || index < self.begin || index > self.end {
            return 0;
        }
        self.counts[self.slot(index as i64)]
    }

    /// Adds `value` to the counter at `index`, widening the window if needed.
    ///
    /// Returns `0` on success. Otherwise nothing is modified and the return
    /// value is the number of [scale_down](Self::scale_down) levels required
    /// before `index` (shifted by the same amount) fits.
    pub fn try_increment(&mut self, index: i32, value: u64) -> u32 {
        if !self.occupied {
            self.begin = index;
            self.end = index;
            self.occupied = true;
        } else if index < self.begin || index > self.end {
            let mut low = (index as i64).min(self.begin as i64);
            let mut high = (index as i64).max(self.end as i64);
            let capacity = self.capacity() as i64;

            if high - low >= capacity {
                let mut levels = 0;
                while high - low >= capacity {
                    low >>= 1;
                    high >>= 1;
                    levels += 1;

                    // -1 and 0 never merge, a single slot cannot hold both signs
                    if levels > i32::BITS {
                        break;
                    }
                }
                return levels;
            }

            if index < self.begin {
                self.begin = index;
            } else {
                self.end = index;
            }
        }

        let slot = self.slot(index as i64);
        self.counts[slot] += value;
        0
    }

    /// Halves the index resolution `levels` times.
    ///
    /// Every occupied index `i` moves to `i >> levels`, summing the counters
    /// that collide.
    pub fn scale_down(&mut self, levels: u32) {
        if levels == 0 || !self.occupied {
            return;
        }
        let shift = levels.min(63);

        let mut merged = std::mem::take(&mut self.scratch);
        merged.clear();
        merged.resize(self.counts.len(), 0);

        let begin = self.begin as i64;
        let end = self.end as i64;
        for index in begin..=end {
            let count = self.counts[self.slot(index)];
            if count != 0 {
                merged[self.slot(index >> shift)] += count;
            }
        }

        self.scratch = std::mem::replace(&mut self.counts, merged);
        self.begin = (begin >> shift) as i32;
        self.end = (end >> shift) as i32;
    }

    /// Zeroes every counter and empties the window.
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.begin = 0;
        self.end = 0;
        self.occupied = false;
    }

    /// The counters from [offset](Self::offset) upwards, in index order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let (begin, end) = if self.occupied {
            (self.begin as i64, self.end as i64)
        } else {
            (0, -1)
        };
        (begin..=end).map(move |index| self.counts[self.slot(index)])
    }

    fn slot(&self, index: i64) -> usize {
        index.rem_euclid(self.counts.len() as i64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets(capacity: usize) -> CircularBufferBuckets {
        CircularBufferBuckets::new(capacity).unwrap()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            CircularBufferBuckets::new(0),
            Err(MetricError::Config(_))
        ));
    }

    #[test]
    fn basic_insertions() {
        let mut b = buckets(5);

        assert_eq!(b.capacity(), 5);
        assert_eq!(b.size(), 0);

        assert_eq!(b.try_increment(0, 1), 0);
        assert_eq!(b.size(), 1);
        assert_eq!(b.try_increment(1, 1), 0);
        assert_eq!(b.size(), 2);
        assert_eq!(b.try_increment(3, 1), 0);
        assert_eq!(b.size(), 4);
        assert_eq!(b.try_increment(4, 1), 0);
        assert_eq!(b.size(), 5);
        assert_eq!(b.try_increment(2, 1), 0);
        assert_eq!(b.size(), 5);

        assert_eq!(b.try_increment(9, 1), 1);
        assert_eq!(b.try_increment(5, 1), 1);
        assert_eq!(b.try_increment(-1, 1), 1);
        assert_eq!(b.try_increment(10, 1), 2);
        assert_eq!(b.try_increment(19, 1), 2);
        assert_eq!(b.try_increment(20, 1), 3);
        assert_eq!(b.try_increment(39, 1), 3);
        assert_eq!(b.try_increment(40, 1), 4);

        // rejected increments leave the window untouched
        assert_eq!(b.size(), 5);
        assert_eq!(b.offset(), 0);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn positive_and_negative_windows() {
        let mut b = buckets(5);
        for i in [102, 103, 101, 100, 104] {
            assert_eq!(b.try_increment(i, 1), 0);
        }
        assert_eq!(b.offset(), 100);
        assert_eq!(b.size(), 5);
        assert_eq!(b.try_increment(99, 1), 1);
        assert_eq!(b.try_increment(105, 1), 1);

        let mut b = buckets(5);
        for i in [2, 0, -2, 1, -1] {
            assert_eq!(b.try_increment(i, 1), 0);
        }
        assert_eq!(b.offset(), -2);
        assert_eq!(b.size(), 5);
        assert_eq!(b.try_increment(3, 1), 1);
        assert_eq!(b.try_increment(-3, 1), 1);
    }

    #[test]
    fn integer_overflow() {
        let mut b = buckets(2);

        assert_eq!(b.try_increment(i32::MAX, 1), 0);
        assert_eq!(b.offset(), i32::MAX);
        assert_eq!(b.size(), 1);

        assert_eq!(b.try_increment(1, 1), 30);
        assert_eq!(b.try_increment(0, 1), 30);
        assert_eq!(b.try_increment(-1, 1), 31);
        assert_eq!(b.try_increment(i32::MIN + 1, 1), 31);
        assert_eq!(b.try_increment(i32::MIN, 1), 31);
    }

    #[test]
    fn index_operations() {
        let mut b = buckets(5);
        for (index, times) in [(2, 5), (0, 3), (-2, 1), (1, 4), (-1, 2)] {
            for _ in 0..times {
                b.try_increment(index, 1);
            }
        }

        assert_eq!(b.offset(), -2);
        assert_eq!(b.get(-2), 1);
        assert_eq!(b.get(-1), 2);
        assert_eq!(b.get(0), 3);
        assert_eq!(b.get(1), 4);
        assert_eq!(b.get(2), 5);
        assert_eq!(b.get(3), 0);
        assert_eq!(b.get(-3), 0);
    }

    #[test]
    fn scale_down_empty_capacity_1() {
        let mut b = buckets(1);
        b.scale_down(1);
        b.scale_down(2);
        b.scale_down(3);
        b.scale_down(4);

        b.try_increment(0, 1);

        assert_eq!(b.offset(), 0);
        assert_eq!(b.size(), 1);
        assert_eq!(b.get(0), 1);
    }

    #[test]
    fn scale_down_at_i32_limits() {
        let mut b = buckets(1);
        b.try_increment(i32::MAX, 1);
        b.scale_down(1);
        assert_eq!(b.offset(), 0x3FFFFFFF);
        assert_eq!(b.get(0x3FFFFFFF), 1);

        let mut b = buckets(1);
        b.try_increment(i32::MIN, 1);
        b.scale_down(1);
        assert_eq!(b.offset(), -0x40000000);
        assert_eq!(b.get(-0x40000000), 1);
    }

    #[test]
    fn scale_down_capacity_2() {
        let mut b = buckets(2);
        b.try_increment(i32::MIN, 2);
        b.try_increment(i32::MIN + 1, 1);
        b.scale_down(1);
        assert_eq!(b.size(), 1);
        assert_eq!(b.get(b.offset()), 3);

        let mut b = buckets(2);
        b.try_increment(i32::MAX - 1, 2);
        b.try_increment(i32::MAX, 1);
        b.scale_down(1);
        assert_eq!(b.size(), 1);
        assert_eq!(b.get(b.offset()), 3);
        assert_eq!(b.get(b.offset() + 1), 0);

        let mut b = buckets(2);
        b.try_increment(i32::MAX - 2, 2);
        b.try_increment(i32::MAX - 1, 1);
        b.scale_down(1);
        assert_eq!(b.size(), 2);
        assert_eq!(b.get(b.offset()), 2);
        assert_eq!(b.get(b.offset() + 1), 1);
    }

    #[test]
    fn scale_down_merges_pairs() {
        struct TestCase {
            capacity: usize,
            increments: Vec<(i32, u64)>,
            offset: i32,
            counts: Vec<u64>,
        }

        let test_cases = vec![
            TestCase {
                capacity: 3,
                increments: vec![(0, 2), (1, 4), (2, 8)],
                offset: 0,
                counts: vec![6, 8],
            },
            TestCase {
                capacity: 3,
                increments: vec![(1, 2), (2, 4), (3, 8)],
                offset: 0,
                counts: vec![2, 12],
            },
            TestCase {
                capacity: 3,
                increments: vec![(2, 2), (3, 4), (4, 8)],
                offset: 1,
                counts: vec![6, 8],
            },
            TestCase {
                capacity: 3,
                increments: vec![(5, 2), (6, 4), (7, 8)],
                offset: 2,
                counts: vec![2, 12],
            },
            TestCase {
                capacity: 4,
                increments: vec![(0, 2), (1, 4), (2, 8), (2, 16)],
                offset: 0,
                counts: vec![6, 24],
            },
            TestCase {
                capacity: 4,
                increments: vec![(1, 2), (2, 4), (3, 8), (4, 16)],
                offset: 0,
                counts: vec![2, 12, 16],
            },
            TestCase {
                capacity: 4,
                increments: vec![(7, 2), (8, 4), (9, 8), (10, 16)],
                offset: 3,
                counts: vec![2, 12, 16],
            },
            TestCase {
                capacity: 4,
                increments: vec![(-3, 2), (-2, 4), (-1, 8), (0, 16)],
                offset: -2,
                counts: vec![2, 12, 16],
            },
        ];

        for test in test_cases {
            let mut b = buckets(test.capacity);
            for (index, value) in &test.increments {
                assert_eq!(b.try_increment(*index, *value), 0);
            }
            b.scale_down(1);

            assert_eq!(b.offset(), test.offset, "{:?}", test.increments);
            assert_eq!(b.size(), test.counts.len(), "{:?}", test.increments);
            assert_eq!(
                b.iter().collect::<Vec<_>>(),
                test.counts,
                "{:?}",
                test.increments
            );
        }
    }

    #[test]
    fn scale_down_composes() {
        let increments = [(-7, 1), (-3, 2), (0, 3), (4, 4), (9, 5)];

        let mut twice = buckets(20);
        let mut once = buckets(20);
        for (index, value) in increments {
            twice.try_increment(index, value);
            once.try_increment(index, value);
        }
        twice.scale_down(1);
        twice.scale_down(1);
        once.scale_down(2);

        assert_eq!(twice.offset(), once.offset());
        assert_eq!(twice.iter().collect::<Vec<_>>(), once.iter().collect::<Vec<_>>());
        assert_eq!(once.offset(), -2);
        assert_eq!(once.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn reset_empties_window() {
        let mut b = buckets(4);
        b.try_increment(5, 3);
        b.try_increment(6, 1);
        b.reset();

        assert_eq!(b.size(), 0);
        assert_eq!(b.offset(), 0);
        assert_eq!(b.get(5), 0);
        assert_eq!(b.iter().count(), 0);

        assert_eq!(b.try_increment(-100, 2), 0);
        assert_eq!(b.offset(), -100);
        assert_eq!(b.get(-100), 2);
    }
}
