/*
    Stress test for recording while a delta collector runs and reclaims idle
    points. Attribute sets rotate over time, so without reclamation the store
    would stay in overflow after the first few seconds.

    Run with:
    cargo run --release --bin metrics_collect
*/

use std::{
    cell::RefCell,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

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
            .with_temporality(Temporality::Delta)
            .with_cardinality_limit(1000)
            .with_reclaim_unused_points(true)
    )
    .expect("valid configuration");
    static ref START: Instant = Instant::now();
}

static COLLECTED: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

fn main() {
    throughput::init_internal_logs();
    lazy_static::initialize(&START);
    throughput::test_throughput_with_background(test_rotating_counter, || {
        std::thread::sleep(Duration::from_millis(200));
        let start = Instant::now();
        let points = STORE.collect().len();
        let total = COLLECTED.fetch_add(1, Ordering::Relaxed) + 1;
        if total % 25 == 0 {
            println!(
                "Collections: {total}, points: {points}, last collect: {:?}, overflowed: {}",
                start.elapsed(),
                STORE.dropped_measurements()
            );
        }
    });
}

fn test_rotating_counter() {
    // 500 attribute sets are live at any time, each second they move on.
    let generation = START.elapsed().as_secs() as i64;
    let member = CURRENT_RNG.with(|rng| rng.borrow_mut().random_range(0..500_i64));
    STORE.update(
        1,
        &[
            KeyValue::new("generation", generation),
            KeyValue::new("member", member),
        ],
    );
}
