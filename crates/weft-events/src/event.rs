//! Typed lifecycle events emitted by the graph executor.

use chrono::{DateTime, Utc};
use weft_core::{ExecutionId, NodeId, StepId, StepStatus, TenantId, WorkflowId};

/// Identifies the execution an event belongs to and the rooms it fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionScope {
    /// The execution.
    pub execution_id: ExecutionId,
    /// Its workflow.
    pub workflow_id: WorkflowId,
    /// Its tenant.
    pub tenant_id: TenantId,
}

/// Per-step detail carried on step lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    /// Persisted step row, when one exists.
    pub step_id: Option<StepId>,
    /// The definition node.
    pub node_id: NodeId,
    /// The node's action kind.
    pub node_type: String,
    /// Step status at the time of the event.
    pub status: StepStatus,
    /// Output, on completion.
    pub output: Option<serde_json::Value>,
    /// Error string, on failure.
    pub error: Option<String>,
    /// Wall-clock duration, on terminal events.
    pub duration_ms: Option<u64>,
    /// When the step started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A lifecycle event of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// The executor picked the execution up.
    Started {
        /// Event scope.
        scope: ExecutionScope,
    },
    /// All reachable terminal nodes finished without a fatal error.
    Completed {
        /// Event scope.
        scope: ExecutionScope,
        /// Merged outputs of the sink nodes.
        output: Option<serde_json::Value>,
    },
    /// A fatal error ended the execution.
    Failed {
        /// Event scope.
        scope: ExecutionScope,
        /// The first fatal error.
        error: String,
    },
    /// The cancellation token was tripped.
    Cancelled {
        /// Event scope.
        scope: ExecutionScope,
    },
    /// Terminal-step progress counter.
    Progress {
        /// Event scope.
        scope: ExecutionScope,
        /// Number of non-skipped reachable nodes.
        total_steps: usize,
        /// Steps that reached a terminal status (completed, failed, skipped).
        completed_steps: usize,
    },
    /// A step was dispatched.
    StepStarted {
        /// Event scope.
        scope: ExecutionScope,
        /// Step detail.
        step: StepEvent,
    },
    /// A step completed successfully.
    StepCompleted {
        /// Event scope.
        scope: ExecutionScope,
        /// Step detail.
        step: StepEvent,
    },
    /// A step failed terminally.
    StepFailed {
        /// Event scope.
        scope: ExecutionScope,
        /// Step detail.
        step: StepEvent,
    },
    /// A step sat behind an unselected branch and never ran.
    StepSkipped {
        /// Event scope.
        scope: ExecutionScope,
        /// Step detail.
        step: StepEvent,
    },
}

impl ExecutionEvent {
    /// The event's scope.
    #[must_use]
    pub const fn scope(&self) -> &ExecutionScope {
        match self {
            Self::Started { scope }
            | Self::Completed { scope, .. }
            | Self::Failed { scope, .. }
            | Self::Cancelled { scope }
            | Self::Progress { scope, .. }
            | Self::StepStarted { scope, .. }
            | Self::StepCompleted { scope, .. }
            | Self::StepFailed { scope, .. }
            | Self::StepSkipped { scope, .. } => scope,
        }
    }

    /// The wire `type` field.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "execution.started",
            Self::Completed { .. } => "execution.completed",
            Self::Failed { .. } => "execution.failed",
            Self::Cancelled { .. } => "execution.cancelled",
            Self::Progress { .. } => "execution.progress",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::StepSkipped { .. } => "step.skipped",
        }
    }
}
