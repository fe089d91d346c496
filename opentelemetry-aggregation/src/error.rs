use std::result;
use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for aggregation operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned while building or operating an aggregator.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
    /// Invalid configuration
    #[error("Config error {0}")]
    Config(String),
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
