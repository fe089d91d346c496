use std::hash::{DefaultHasher, Hash, Hasher};

use opentelemetry::{Key, KeyValue, Value};

/// Key of the synthetic attribute carried by the overflow metric point.
pub const OVERFLOW_ATTRIBUTE_KEY: &str = "otel.metric.overflow";

/// The attributes of the metric point that absorbs measurements beyond the
/// cardinality limit.
pub(crate) fn overflow_attributes() -> Vec<KeyValue> {
    vec![KeyValue::new(OVERFLOW_ATTRIBUTE_KEY, true)]
}

/// A unique set of attributes that identifies a time series.
///
/// Attributes are sorted by key and a key that appears more than once keeps
/// the last supplied value, so the order in which attributes are passed does
/// not affect identity. The hash is computed once on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeSet(Vec<KeyValue>, u64);

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet::from(&[][..])
    }
}

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        let vec = canonical_attributes(values);
        let hash = calculate_hash(&vec);
        AttributeSet(vec, hash)
    }
}

/// Sorts `values` by key, keeping the last value of a repeated key.
pub(crate) fn canonical_attributes(values: &[KeyValue]) -> Vec<KeyValue> {
    let mut vec = values.to_vec();
    vec.sort_by(|a, b| a.key.cmp(&b.key));

    // `dedup_by` keeps the first of a run, reversing makes it keep the last
    if vec.len() > 1 {
        vec.reverse();
        vec.dedup_by(|a, b| a.key == b.key);
        vec.reverse();
    }
    vec
}

fn calculate_hash(values: &[KeyValue]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.iter().fold(&mut hasher, |hasher, item| {
        item.hash(hasher);
        hasher
    });
    hasher.finish()
}

impl AttributeSet {
    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over key value pairs in the set
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.0.iter().map(|kv| (&kv.key, &kv.value))
    }

    /// The canonical, sorted attributes.
    pub fn as_slice(&self) -> &[KeyValue] {
        &self.0
    }

    /// Consumes the set, returning the sorted attributes.
    pub fn into_vec(self) -> Vec<KeyValue> {
        self.0
    }
}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.1)
    }
}
