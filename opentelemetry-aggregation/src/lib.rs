//! # OpenTelemetry Aggregation
//!
//! The in-process aggregation engine of an OpenTelemetry metrics SDK. It
//! turns a high frequency stream of measurements, each tagged with a set of
//! attributes, into one running aggregate per attribute set, and snapshots
//! those aggregates for export under cumulative or delta temporality.
//!
//! An [AggregatorStore] is created per metric stream from an
//! [AggregatorConfig]. Producers call [AggregatorStore::update] from any
//! number of threads while a collector periodically calls
//! [AggregatorStore::collect].
//!
//! ```
//! use opentelemetry::KeyValue;
//! use opentelemetry_aggregation::{
//!     Aggregation, AggregatorConfig, AggregatorStore, MetricData, Temporality,
//! };
//!
//! let store = AggregatorStore::<f64>::new(
//!     AggregatorConfig::new(Aggregation::default_exponential_histogram())
//!         .with_temporality(Temporality::Delta)
//!         .with_cardinality_limit(100),
//! )
//! .unwrap();
//!
//! for latency in [1.5, 2.0, 40.0] {
//!     store.update(latency, &[KeyValue::new("route", "/users")]);
//! }
//!
//! if let MetricData::ExponentialHistogram(histogram) = store.collect() {
//!     assert_eq!(histogram.data_points[0].count, 3);
//! }
//! ```
//!
//! Supported aggregations are sums, precomputed sums, last values, explicit
//! bucket histograms and base-2 exponential histograms. See [Aggregation].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod aggregation;
mod attribute_set;
mod config;
pub mod data;
pub mod error;
mod internal;

pub use aggregation::Aggregation;
pub use attribute_set::{AttributeSet, OVERFLOW_ATTRIBUTE_KEY};
pub use config::{AggregatorConfig, DEFAULT_CARDINALITY_LIMIT};
pub use data::{MetricData, Temporality};
pub use error::{MetricError, MetricResult};
pub use internal::{
    AggregatorStore, AtomicTracker, AtomicallyUpdate, BucketIndexMapper, CircularBufferBuckets,
    ExplicitBounds, F64AtomicTracker, Number, EXPO_MAX_SCALE, EXPO_MIN_SCALE,
};
