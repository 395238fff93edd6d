//! Weft Store - Relational persistence for the execution core.
//!
//! This crate provides:
//! - The [`Store`]: a bounded `PgPool` wrapper implementing the engine's
//!   [`weft_engine::ExecutionStore`] and [`weft_engine::DefinitionSource`],
//!   the triggers' [`weft_triggers::WebhookEventStore`], the quota crate's
//!   [`weft_quota::AiUsageSink`], and admission's
//!   [`weft_admission::TenantDirectory`]
//! - Append-only workflow version history with restore-as-new-version
//! - Dashboard aggregates: status counts by day, duration percentiles,
//!   top-failing workflows
//!
//! Queries use the runtime-bound `sqlx` API; schema DDL and migrations live
//! with the deployment, not here.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod dashboard;
mod db;
mod error;
mod executions;
mod models;
mod schedules;
mod tenants;
mod usage;
mod webhooks;
mod workflows;

pub use dashboard::{DurationPercentiles, StatusDayCount, WorkflowFailureCount};
pub use db::Store;
pub use error::{StoreError, StoreResult};
pub use workflows::WorkflowVersion;
