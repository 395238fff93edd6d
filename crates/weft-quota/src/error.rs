//! Quota error types.

use chrono::NaiveDate;

/// Errors from quota operations.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// `from` is after `to` in a usage query.
    #[error("reversed date range: {from} > {to}")]
    ReversedRange {
        /// Start of the requested range.
        from: NaiveDate,
        /// End of the requested range.
        to: NaiveDate,
    },

    /// The counter store failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A durable usage write failed.
    #[error("usage sink error: {0}")]
    Sink(String),
}

/// Result alias for quota operations.
pub type QuotaResult<T> = Result<T, QuotaError>;
