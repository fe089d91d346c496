/*
    Stress test for unbounded attribute sets. Almost every measurement lands
    in the overflow point, the store must neither grow nor log more than once.

    Run with:
    cargo run --release --bin metrics_overflow
*/

use std::cell::RefCell;

use lazy_static::lazy_static;
use opentelemetry::KeyValue;
use opentelemetry_aggregation::{Aggregation, AggregatorConfig, AggregatorStore};
use rand::{
    rngs::{self},
    Rng, SeedableRng,
};

mod throughput;

lazy_static! {
    static ref STORE: AggregatorStore<u64> = AggregatorStore::new(AggregatorConfig::new(
        Aggregation::Sum { monotonic: true }
    ))
    .expect("valid configuration");
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

fn main() {
    throughput::init_internal_logs();
    throughput::test_throughput_with_background(test_counter, || {
        std::thread::sleep(std::time::Duration::from_secs(5));
        println!(
            "Points: {}, overflowed measurements: {}",
            STORE.len(),
            STORE.dropped_measurements()
        );
    });
}

fn test_counter() {
    // The main goal of this test is to ensure that the store is not growing its
    // memory usage indefinitely even when user code misbehaves by producing
    // unbounded metric points (unique time series).
    // It also checks that internal logging is also done in a bounded way.
    let rand = CURRENT_RNG.with(|rng| rng.borrow_mut().random_range(0..100000000));
    STORE.update(1, &[KeyValue::new("A", rand)]);
}
