//! Row types and domain conversions.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use weft_core::{
    Execution, ExecutionId, ExecutionStatus, NodeId, Step, StepId, StepStatus, Tenant, TenantId,
    TenantQuotas, TenantStatus, TriggerKind, WorkflowId,
};

use crate::error::StoreError;

#[derive(Debug, FromRow)]
pub(crate) struct ExecutionRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub version: i32,
    pub trigger_kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, StoreError> {
        Ok(Execution {
            id: ExecutionId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            workflow_id: WorkflowId::from_uuid(row.workflow_id),
            version: row.version,
            trigger: parse_trigger(&row.trigger_kind)?,
            payload: row.payload,
            status: parse_execution_status(&row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            output: row.output,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StepRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub node_type: String,
    pub status: String,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt: i32,
}

impl TryFrom<StepRow> for Step {
    type Error = StoreError;

    fn try_from(row: StepRow) -> Result<Self, StoreError> {
        Ok(Step {
            id: StepId::from_uuid(row.id),
            execution_id: ExecutionId::from_uuid(row.execution_id),
            node_id: NodeId::new(row.node_id),
            node_type: row.node_type,
            status: parse_step_status(&row.status)?,
            input: row.input,
            output: row.output,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
            attempt: u32::try_from(row.attempt.max(1)).unwrap_or(1),
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TenantRow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub daily_workflow_limit: i64,
    pub monthly_workflow_limit: i64,
    pub daily_step_limit: i64,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, StoreError> {
        let status = match row.status.as_str() {
            "active" => TenantStatus::Active,
            "suspended" => TenantStatus::Suspended,
            other => return Err(StoreError::Corrupt(format!("tenant status {other:?}"))),
        };
        Ok(Tenant {
            id: TenantId::from_uuid(row.id),
            name: row.name,
            status,
            quotas: TenantQuotas {
                daily_workflow_limit: row.daily_workflow_limit,
                monthly_workflow_limit: row.monthly_workflow_limit,
                daily_step_limit: row.daily_step_limit,
            },
        })
    }
}

pub(crate) fn parse_execution_status(s: &str) -> Result<ExecutionStatus, StoreError> {
    match s {
        "pending" => Ok(ExecutionStatus::Pending),
        "running" => Ok(ExecutionStatus::Running),
        "completed" => Ok(ExecutionStatus::Completed),
        "failed" => Ok(ExecutionStatus::Failed),
        "cancelled" => Ok(ExecutionStatus::Cancelled),
        other => Err(StoreError::Corrupt(format!("execution status {other:?}"))),
    }
}

pub(crate) fn parse_step_status(s: &str) -> Result<StepStatus, StoreError> {
    match s {
        "pending" => Ok(StepStatus::Pending),
        "running" => Ok(StepStatus::Running),
        "completed" => Ok(StepStatus::Completed),
        "failed" => Ok(StepStatus::Failed),
        "skipped" => Ok(StepStatus::Skipped),
        other => Err(StoreError::Corrupt(format!("step status {other:?}"))),
    }
}

pub(crate) fn parse_trigger(s: &str) -> Result<TriggerKind, StoreError> {
    match s {
        "manual" => Ok(TriggerKind::Manual),
        "webhook" => Ok(TriggerKind::Webhook),
        "schedule" => Ok(TriggerKind::Schedule),
        "api" => Ok(TriggerKind::Api),
        other => Err(StoreError::Corrupt(format!("trigger kind {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_string_codes() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(parse_execution_status(status.as_str()).unwrap(), status);
        }
        for status in [
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
        ] {
            assert_eq!(parse_step_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_execution_status("exploded").is_err());
    }

    #[test]
    fn trigger_round_trips_through_string_codes() {
        for trigger in [
            TriggerKind::Manual,
            TriggerKind::Webhook,
            TriggerKind::Schedule,
            TriggerKind::Api,
        ] {
            assert_eq!(parse_trigger(trigger.as_str()).unwrap(), trigger);
        }
    }
}
