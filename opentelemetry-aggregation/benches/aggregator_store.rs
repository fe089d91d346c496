/*
    Run this benchmark with:
    cargo bench --bench aggregator_store

    The overflow cases use a cardinality limit far below the number of
    generated time series, the reclaim case rotates attribute sets through a
    delta store that reclaims idle points.
*/

use std::cell::RefCell;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use opentelemetry::KeyValue;
use opentelemetry_aggregation::{Aggregation, AggregatorConfig, AggregatorStore, Temporality};
use rand::{
    rngs::{self},
    Rng, SeedableRng,
};

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

static ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

fn random_attributes() -> [KeyValue; 3] {
    // 10*10*10 = 1000 time series.
    let rands = CURRENT_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        [
            rng.random_range(0..10),
            rng.random_range(0..10),
            rng.random_range(0..10),
        ]
    });
    [
        KeyValue::new("attribute1", ATTRIBUTE_VALUES[rands[0]]),
        KeyValue::new("attribute2", ATTRIBUTE_VALUES[rands[1]]),
        KeyValue::new("attribute3", ATTRIBUTE_VALUES[rands[2]]),
    ]
}

fn store<T: opentelemetry_aggregation::Number>(
    aggregation: Aggregation,
    temporality: Temporality,
    limit: usize,
) -> AggregatorStore<T> {
    AggregatorStore::new(
        AggregatorConfig::new(aggregation)
            .with_temporality(temporality)
            .with_cardinality_limit(limit),
    )
    .unwrap()
}

fn counter_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("Counter_Update");
    for temporality in [Temporality::Cumulative, Temporality::Delta] {
        let store = store::<u64>(Aggregation::Sum { monotonic: true }, temporality, 2000);
        group.bench_function(BenchmarkId::from_parameter(format!("{temporality:?}")), |b| {
            b.iter(|| store.update(1, &random_attributes()))
        });
    }
    group.finish();
}

fn counter_update_sorted_miss(c: &mut Criterion) {
    let store = store::<u64>(Aggregation::Sum { monotonic: true }, Temporality::Delta, 2000);
    c.bench_function("Counter_Update_Unsorted", |b| {
        b.iter(|| {
            let mut attributes = random_attributes();
            attributes.reverse();
            store.update(1, &attributes)
        })
    });
}

fn counter_overflow(c: &mut Criterion) {
    let store = store::<u64>(Aggregation::Sum { monotonic: true }, Temporality::Cumulative, 100);
    c.bench_function("Counter_Overflow", |b| {
        b.iter(|| store.update(1, &random_attributes()))
    });
}

fn counter_reclaim(c: &mut Criterion) {
    let store = AggregatorStore::<u64>::new(
        AggregatorConfig::new(Aggregation::Sum { monotonic: true })
            .with_temporality(Temporality::Delta)
            .with_cardinality_limit(500)
            .with_reclaim_unused_points(true),
    )
    .unwrap();
    let mut iteration = 0_u64;
    c.bench_function("Counter_Reclaim", |b| {
        b.iter(|| {
            iteration += 1;
            store.update(1, &random_attributes());
            if iteration % 1000 == 0 {
                store.collect();
            }
        })
    });
}

fn histogram_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("Histogram_Update");
    let explicit = store::<u64>(Aggregation::default_histogram(), Temporality::Delta, 2000);
    group.bench_function("Explicit", |b| {
        b.iter(|| {
            let value = CURRENT_RNG.with(|rng| rng.borrow_mut().random_range(0..10_000));
            explicit.update(value, &random_attributes())
        })
    });

    let exponential = store::<f64>(
        Aggregation::default_exponential_histogram(),
        Temporality::Delta,
        2000,
    );
    group.bench_function("Exponential", |b| {
        b.iter(|| {
            let value = CURRENT_RNG.with(|rng| rng.borrow_mut().random_range(0.001..10_000.0));
            exponential.update(value, &random_attributes())
        })
    });
    group.finish();
}

fn collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("Collect");
    for temporality in [Temporality::Cumulative, Temporality::Delta] {
        let store = store::<u64>(Aggregation::default_histogram(), temporality, 2000);
        group.bench_function(BenchmarkId::from_parameter(format!("{temporality:?}")), |b| {
            b.iter(|| {
                for _ in 0..100 {
                    store.update(1, &random_attributes());
                }
                store.collect()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    counter_update,
    counter_update_sorted_miss,
    counter_overflow,
    counter_reclaim,
    histogram_update,
    collect
);
criterion_main!(benches);
