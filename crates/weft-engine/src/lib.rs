//! Weft Engine - The graph executor.
//!
//! This crate turns a stored workflow definition into a correctly ordered,
//! fault-tolerant, observable execution:
//! - DAG scheduling with a bounded worker pool and a lexicographic tie-break
//! - Per-step lifecycle: persist, emit, interpolate, invoke, retry
//! - Data passing along edges, port-based control flow, skip propagation
//! - Hierarchical cancellation and per-step / per-execution timeouts
//! - Dry-run traversal with side-effect-free stub actions
//!
//! The executor depends on narrow contracts only: an [`ActionRegistry`] for
//! node implementations, a [`CredentialResolver`] for secrets, an
//! [`ExecutionStore`] for persistence, and a [`StepMeter`] for usage
//! accounting. Triggers reach the engine through [`ExecutionRunner`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod action;
pub mod actions;
mod context;
mod credential;
mod executor;
mod graph;
mod runner;
mod store;

pub use action::{Action, ActionContext, ActionOutput, ActionRegistry};
pub use context::TemplateContext;
pub use credential::{CredentialResolver, NoCredentials, StaticCredentials};
pub use executor::{ExecutionMode, Executor, ExecutorConfig};
pub use graph::ExecutionGraph;
pub use runner::{AdmissionGate, ExecutionRunner, NoopMeter, OpenGate, StepMeter, WorkflowRunner};
pub use store::{DefinitionSource, ExecutionStore, InMemoryDefinitions, InMemoryExecutionStore};
