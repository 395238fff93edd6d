//! Schedule persistence.
//!
//! The scheduler holds its working set in memory; these queries load it at
//! startup and record fire history in `schedule_executions`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use weft_core::{ExecutionId, ScheduleId, TenantId, WorkflowId};
use weft_triggers::Schedule;

use crate::db::Store;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    workflow_id: uuid::Uuid,
    expression: String,
    timezone: String,
    active: bool,
    last_fired_at: Option<DateTime<Utc>>,
}

impl From<ScheduleRow> for Schedule {
    fn from(row: ScheduleRow) -> Self {
        Schedule {
            id: ScheduleId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            workflow_id: WorkflowId::from_uuid(row.workflow_id),
            expression: row.expression,
            timezone: row.timezone,
            active: row.active,
            last_fired_at: row.last_fired_at,
        }
    }
}

impl Store {
    /// Every active schedule, for scheduler startup.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    pub async fn list_active_schedules(&self) -> StoreResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            "SELECT id, tenant_id, workflow_id, expression, timezone, active, last_fired_at \
             FROM schedules WHERE active",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Schedule::from).collect())
    }

    /// Record a fire time on the schedule row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the schedule no longer exists.
    pub async fn update_last_fired(
        &self,
        schedule: ScheduleId,
        fired_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE schedules SET last_fired_at = $2 WHERE id = $1")
            .bind(schedule.as_uuid())
            .bind(fired_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("schedule {schedule}")));
        }
        Ok(())
    }

    /// Append one row of fire history.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    pub async fn record_schedule_execution(
        &self,
        schedule: ScheduleId,
        execution: ExecutionId,
        fired_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO schedule_executions (schedule_id, execution_id, fired_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(schedule.as_uuid())
        .bind(execution.as_uuid())
        .bind(fired_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
