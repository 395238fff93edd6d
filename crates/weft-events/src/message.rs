//! WebSocket wire message shapes.
//!
//! A frame is a JSON object. Execution events use [`ExecutionMessage`];
//! collaboration traffic uses [`CollabMessage`] with a type-specific payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{ExecutionId, StepId, TenantId, WorkflowId};

/// Progress counters carried on `execution.progress` frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Number of non-skipped reachable nodes.
    pub total_steps: usize,
    /// Steps that reached a terminal status.
    pub completed_steps: usize,
    /// `completed_steps / total_steps`, in percent.
    pub percentage: f64,
}

impl ProgressInfo {
    /// Build the counters, guarding the zero-node case.
    #[must_use]
    pub fn new(total_steps: usize, completed_steps: usize) -> Self {
        let percentage = if total_steps == 0 {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                completed_steps as f64 / total_steps as f64 * 100.0
            }
        };
        Self {
            total_steps,
            completed_steps,
            percentage,
        }
    }
}

/// Per-step detail carried on `step.*` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Persisted step row, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// The definition node.
    pub node_id: String,
    /// The node's action kind.
    pub node_type: String,
    /// Step status string code.
    pub status: String,
    /// Output, on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    /// Error string, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// When the step started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An execution event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMessage {
    /// Event type, e.g. `execution.started` or `step.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// The execution.
    pub execution_id: ExecutionId,
    /// Its workflow.
    pub workflow_id: WorkflowId,
    /// Its tenant.
    pub tenant_id: TenantId,
    /// Execution status, on `execution.*` frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Progress counters, on `execution.progress` frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressInfo>,
    /// Step detail, on `step.*` frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepInfo>,
    /// Execution error, on `execution.failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution output, on `execution.completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

/// Collaboration frame vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollabMessageType {
    /// Client requests to join the session.
    Join,
    /// Client requests to leave the session.
    Leave,
    /// Client reports its cursor/selection.
    Presence,
    /// Client requests a lock.
    LockAcquire,
    /// Client releases a lock.
    LockRelease,
    /// Client submits a graph change.
    Change,
    /// Server: a user joined.
    UserJoined,
    /// Server: a user left.
    UserLeft,
    /// Server: a user's presence changed.
    PresenceUpdate,
    /// Server: a lock was granted.
    LockAcquired,
    /// Server: a lock was released.
    LockReleased,
    /// Server: a lock request was refused.
    LockFailed,
    /// Server: a graph change was applied.
    ChangeApplied,
    /// Server: an error frame.
    Error,
}

/// A collaboration frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabMessage {
    /// Frame type.
    #[serde(rename = "type")]
    pub message_type: CollabMessageType,
    /// Type-specific payload.
    pub payload: serde_json::Value,
    /// When the frame was produced.
    pub timestamp: DateTime<Utc>,
}

impl CollabMessage {
    /// Build a frame stamped with the current time.
    #[must_use]
    pub fn new(message_type: CollabMessageType, payload: serde_json::Value) -> Self {
        Self {
            message_type,
            payload,
            timestamp: Utc::now(),
        }
    }
}
