/*
    Stress test for the Sum aggregation with 1000 time series, all within the
    default cardinality limit.

    Run with:
    cargo run --release --bin metrics
*/

use std::cell::RefCell;

use lazy_static::lazy_static;
use opentelemetry::KeyValue;
use opentelemetry_aggregation::{Aggregation, AggregatorConfig, AggregatorStore, Temporality};
use rand::{
    rngs::{self},
    Rng, SeedableRng,
};

mod throughput;

lazy_static! {
    static ref STORE: AggregatorStore<u64> = AggregatorStore::new(
        AggregatorConfig::new(Aggregation::Sum { monotonic: true })
            .with_temporality(Temporality::Cumulative)
    )
    .expect("valid configuration");
}

static ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

fn main() {
    throughput::init_internal_logs();
    throughput::test_throughput(test_counter);
}

fn test_counter() {
    let len = ATTRIBUTE_VALUES.len();
    let rands = CURRENT_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        [
            rng.random_range(0..len),
            rng.random_range(0..len),
            rng.random_range(0..len),
        ]
    });

    // each attribute has 10 possible values, so there are 1000 possible combinations (time-series)
    STORE.update(
        1,
        &[
            KeyValue::new("attribute1", ATTRIBUTE_VALUES[rands[0]]),
            KeyValue::new("attribute2", ATTRIBUTE_VALUES[rands[1]]),
            KeyValue::new("attribute3", ATTRIBUTE_VALUES[rands[2]]),
        ],
    );
}
