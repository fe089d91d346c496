/*
    Stress test for histogram aggregations. Pass `exponential` as the first
    argument to use a base-2 exponential histogram instead of the default
    explicit bucket one.

    Run with:
    cargo run --release --bin metrics_histogram [exponential]
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
    static ref STORE: AggregatorStore<f64> = {
        let aggregation = match std::env::args().nth(1).as_deref() {
            Some("exponential") => Aggregation::default_exponential_histogram(),
            _ => Aggregation::default_histogram(),
        };
        println!("Aggregation: {aggregation}");
        AggregatorStore::new(
            AggregatorConfig::new(aggregation).with_temporality(Temporality::Delta),
        )
        .expect("valid configuration")
    };
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
    lazy_static::initialize(&STORE);
    throughput::test_throughput_with_background(test_histogram, || {
        std::thread::sleep(std::time::Duration::from_millis(500));
        STORE.collect();
    });
}

fn test_histogram() {
    let len = ATTRIBUTE_VALUES.len();
    let (rands, value) = CURRENT_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        (
            [
                rng.random_range(0..len),
                rng.random_range(0..len),
                rng.random_range(0..len),
            ],
            rng.random_range(0.0..10_000.0),
        )
    });

    STORE.update(
        value,
        &[
            KeyValue::new("attribute1", ATTRIBUTE_VALUES[rands[0]]),
            KeyValue::new("attribute2", ATTRIBUTE_VALUES[rands[1]]),
            KeyValue::new("attribute3", ATTRIBUTE_VALUES[rands[2]]),
        ],
    );
}
