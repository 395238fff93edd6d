//! Weft Triggers - Everything that starts an execution.
//!
//! This crate provides:
//! - Webhook ingest: shared-secret HMAC verification, a boolean filter DSL
//!   over the payload, event persistence, and replay
//! - The cron scheduler: per-workflow 5-field expressions with timezones,
//!   monotonic firing, and a single bounded catch-up after downtime
//! - Manual/API invocation
//!
//! Every source produces the same [`weft_core::ExecutionRequest`] and hands
//! it to [`weft_engine::ExecutionRunner`]; admission happens behind that
//! contract, never here.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod filter;
mod manual;
mod schedule;
mod webhook;

pub use error::{ScheduleError, WebhookError};
pub use filter::{FilterMatch, FilterOp, FilterRule, FilterSet, MatchMode};
pub use manual::ManualTrigger;
pub use schedule::{Schedule, Scheduler, next_fire_times};
pub use webhook::{
    InMemoryWebhookEvents, IngestOutcome, WebhookEventStore, WebhookIngestor, WebhookTrigger,
};
