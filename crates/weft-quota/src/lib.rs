//! Weft Quota - Atomic period counters and AI usage accounting.
//!
//! This crate provides:
//! - The [`QuotaTracker`]: Redis-backed daily/monthly counters used for
//!   admission and usage reporting; atomicity comes from the store, not from
//!   in-process locks
//! - The [`QuotaService`] trait that admission and the executor consume,
//!   plus an in-memory implementation for tests
//! - AI usage records, the static pricing table, and a buffered logger that
//!   flushes to a durable sink

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod keys;
mod service;
mod tracker;
mod usage;

pub use error::{QuotaError, QuotaResult};
pub use keys::{CounterKind, QuotaPeriod, bucket, counter_key};
pub use service::{InMemoryQuota, QuotaCheck, QuotaService};
pub use tracker::{DailyUsage, QuotaTracker};
pub use usage::{
    AiUsageLogger, AiUsageRecord, AiUsageReport, AiUsageSink, ModelUsage, estimate_cost_cents,
};
