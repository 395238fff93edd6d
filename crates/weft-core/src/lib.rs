//! Weft Core - Foundation types for the Weft workflow execution core.
//!
//! This crate provides:
//! - Strongly-typed identifiers shared across the workspace
//! - The workflow definition model (nodes, edges) and DAG validation
//! - Execution and step state machines
//! - Trigger kinds and the uniform execution request
//! - The webhook event record
//! - Retry policy with exponential backoff
//! - The error taxonomy surfaced by the execution core
//! - Tenant records consumed by admission

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod definition;
pub mod error;
pub mod execution;
pub mod retry;
pub mod tenant;
pub mod types;
pub mod webhook;

pub use definition::{DefinitionError, Edge, Node, OnErrorPolicy, WorkflowDefinition};
pub use error::{WorkflowError, WorkflowResult};
pub use execution::{
    Execution, ExecutionRequest, ExecutionStatus, Step, StepStatus, TriggerKind,
};
pub use retry::RetryPolicy;
pub use tenant::{Tenant, TenantQuotas, TenantStatus};
pub use types::{
    EdgeId, EventId, ExecutionId, NodeId, ScheduleId, StepId, TenantId, UserId, WebhookId,
    WorkflowId,
};
pub use webhook::{WebhookEvent, WebhookOutcome};
