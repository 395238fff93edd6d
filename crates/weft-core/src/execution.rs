//! Execution and step records, their state machines, and trigger kinds.
//!
//! State machines:
//! - Execution: `pending → running → {completed, failed, cancelled}`
//! - Step: `pending → running → {completed, failed}`, with `skipped`
//!   reachable directly from `pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExecutionId, NodeId, StepId, TenantId, WorkflowId};

/// How an execution was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Started by a user from the editor or dashboard.
    Manual,
    /// Started by an inbound webhook event.
    Webhook,
    /// Started by the cron scheduler.
    Schedule,
    /// Started by an API client.
    Api,
}

impl TriggerKind {
    /// Stable string code, as persisted and as emitted on the event stream.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Webhook => "webhook",
            Self::Schedule => "schedule",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Created by a trigger, not yet admitted.
    Pending,
    /// Admitted and being driven by the executor.
    Running,
    /// All reachable terminal nodes finished without a fatal error.
    Completed,
    /// A fatal error ended the execution.
    Failed,
    /// The cancellation token was tripped.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Persisted ahead of dispatch.
    Pending,
    /// The action is executing.
    Running,
    /// The action returned successfully.
    Completed,
    /// The action failed after exhausting its retries, or fatally.
    Failed,
    /// The node sat behind an unselected control branch and never ran.
    Skipped,
}

impl StepStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Stable string code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to run a specific version of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution id.
    pub id: ExecutionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The workflow being run.
    pub workflow_id: WorkflowId,
    /// The definition version being run.
    pub version: i32,
    /// How this execution was started.
    pub trigger: TriggerKind,
    /// The trigger payload. JSON by convention; the executor treats it as opaque.
    pub payload: serde_json::Value,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// When the executor picked the execution up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Merged outputs of the sink nodes, for completed executions.
    pub output: Option<serde_json::Value>,
    /// The first fatal error, for failed executions.
    pub error: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl Execution {
    /// Create a `pending` execution for a request that passed admission.
    #[must_use]
    pub fn pending(
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: i32,
        trigger: TriggerKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            tenant_id,
            workflow_id,
            version,
            trigger,
            payload,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// One node's execution within one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step id.
    pub id: StepId,
    /// Owning execution.
    pub execution_id: ExecutionId,
    /// The definition node this step ran.
    pub node_id: NodeId,
    /// The node's action kind at the time of the run.
    pub node_type: String,
    /// Current lifecycle status.
    pub status: StepStatus,
    /// Assembled input, as fed to the action.
    pub input: Option<serde_json::Value>,
    /// Action output, for completed steps.
    pub output: Option<serde_json::Value>,
    /// Error string, for failed steps.
    pub error: Option<String>,
    /// When the step left `pending`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// 1-based attempt number of the final outcome.
    pub attempt: u32,
}

impl Step {
    /// Create a `pending` step for a dispatched node.
    #[must_use]
    pub fn pending(execution_id: ExecutionId, node_id: NodeId, node_type: String) -> Self {
        Self {
            id: StepId::new(),
            execution_id,
            node_id,
            node_type,
            status: StepStatus::Pending,
            input: None,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            attempt: 1,
        }
    }
}

/// The uniform product of every trigger source, handed to admission and then
/// to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Tenant on whose behalf the execution runs.
    pub tenant_id: TenantId,
    /// Workflow to run.
    pub workflow_id: WorkflowId,
    /// Definition version; `None` resolves to the latest saved version.
    pub version: Option<i32>,
    /// How the execution was started.
    pub trigger: TriggerKind,
    /// Trigger payload, exposed to template interpolation as `trigger`.
    pub payload: serde_json::Value,
}
