//! Execution and step persistence.
//!
//! `executions` and `steps` are append-mostly: rows are inserted once and
//! then only their lifecycle columns change. The engine talks to these
//! tables through [`weft_engine::ExecutionStore`].

use sqlx::Row;
use weft_core::{
    Execution, ExecutionId, Step, TenantId, WorkflowError, WorkflowId, WorkflowResult,
};
use weft_engine::ExecutionStore;

use crate::db::Store;
use crate::error::StoreResult;
use crate::models::{ExecutionRow, StepRow};

impl Store {
    pub(crate) async fn insert_execution(&self, execution: &Execution) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO executions \
             (id, tenant_id, workflow_id, version, trigger_kind, payload, status, \
              started_at, completed_at, output, error, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(execution.id.as_uuid())
        .bind(execution.tenant_id.as_uuid())
        .bind(execution.workflow_id.as_uuid())
        .bind(execution.version)
        .bind(execution.trigger.as_str())
        .bind(&execution.payload)
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.output)
        .bind(&execution.error)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn persist_execution(&self, execution: &Execution) -> StoreResult<()> {
        sqlx::query(
            "UPDATE executions SET status = $2, started_at = $3, completed_at = $4, \
             output = $5, error = $6 WHERE id = $1",
        )
        .bind(execution.id.as_uuid())
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.output)
        .bind(&execution.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn fetch_execution(
        &self,
        id: ExecutionId,
    ) -> StoreResult<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT id, tenant_id, workflow_id, version, trigger_kind, payload, status, \
             started_at, completed_at, output, error, created_at \
             FROM executions WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Execution::try_from).transpose()
    }

    /// Recent executions of one workflow, newest first.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError`] on query failure or a corrupt row.
    pub async fn list_executions(
        &self,
        workflow: WorkflowId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Execution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT id, tenant_id, workflow_id, version, trigger_kind, payload, status, \
             started_at, completed_at, output, error, created_at \
             FROM executions WHERE workflow_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(workflow.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Execution::try_from).collect()
    }

    /// Recent executions across one tenant, newest first.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError`] on query failure or a corrupt row.
    pub async fn list_tenant_executions(
        &self,
        tenant: TenantId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Execution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT id, tenant_id, workflow_id, version, trigger_kind, payload, status, \
             started_at, completed_at, output, error, created_at \
             FROM executions WHERE tenant_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(tenant.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Execution::try_from).collect()
    }

    pub(crate) async fn insert_step(&self, step: &Step) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO steps \
             (id, execution_id, node_id, node_type, status, input, output, error, \
              started_at, completed_at, attempt) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(step.id.as_uuid())
        .bind(step.execution_id.as_uuid())
        .bind(step.node_id.as_str())
        .bind(&step.node_type)
        .bind(step.status.as_str())
        .bind(&step.input)
        .bind(&step.output)
        .bind(&step.error)
        .bind(step.started_at)
        .bind(step.completed_at)
        .bind(i32::try_from(step.attempt).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn persist_step(&self, step: &Step) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE steps SET status = $2, input = $3, output = $4, error = $5, \
             started_at = $6, completed_at = $7, attempt = $8 WHERE id = $1",
        )
        .bind(step.id.as_uuid())
        .bind(step.status.as_str())
        .bind(&step.input)
        .bind(&step.output)
        .bind(&step.error)
        .bind(step.started_at)
        .bind(step.completed_at)
        .bind(i32::try_from(step.attempt).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(crate::StoreError::NotFound(format!("step {}", step.id)));
        }
        Ok(())
    }

    pub(crate) async fn fetch_steps(&self, execution: ExecutionId) -> StoreResult<Vec<Step>> {
        let rows = sqlx::query_as::<_, StepRow>(
            "SELECT id, execution_id, node_id, node_type, status, input, output, error, \
             started_at, completed_at, attempt \
             FROM steps WHERE execution_id = $1 ORDER BY started_at NULLS LAST, id",
        )
        .bind(execution.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Step::try_from).collect()
    }

    /// Count of executions per status for one tenant, for quick dashboard
    /// tiles.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError`] on query failure.
    pub async fn status_counts(&self, tenant: TenantId) -> StoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM executions \
             WHERE tenant_id = $1 GROUP BY status",
        )
        .bind(tenant.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
            .collect())
    }
}

#[async_trait::async_trait]
impl ExecutionStore for Store {
    async fn create_execution(&self, execution: &Execution) -> WorkflowResult<()> {
        self.insert_execution(execution)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }

    async fn update_execution(&self, execution: &Execution) -> WorkflowResult<()> {
        self.persist_execution(execution)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }

    async fn get_execution(&self, id: ExecutionId) -> WorkflowResult<Option<Execution>> {
        self.fetch_execution(id)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }

    async fn create_step(&self, step: &Step) -> WorkflowResult<()> {
        self.insert_step(step)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }

    async fn update_step(&self, step: &Step) -> WorkflowResult<()> {
        self.persist_step(step)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }

    async fn list_steps(&self, execution_id: ExecutionId) -> WorkflowResult<Vec<Step>> {
        self.fetch_steps(execution_id)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }
}
