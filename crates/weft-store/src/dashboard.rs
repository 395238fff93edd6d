//! Dashboard aggregates.
//!
//! These queries lean on the `executions (status, created_at)` composite
//! index; they are read-heavy and never lock writer paths.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use weft_core::{TenantId, WorkflowId};

use crate::db::Store;
use crate::error::StoreResult;

/// Executions per (day, status).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatusDayCount {
    /// UTC day.
    pub day: NaiveDate,
    /// Execution status code.
    pub status: String,
    /// Number of executions.
    pub count: i64,
}

/// Execution duration percentiles in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DurationPercentiles {
    /// Median.
    pub p50_ms: f64,
    /// 90th percentile.
    pub p90_ms: f64,
    /// 99th percentile.
    pub p99_ms: f64,
}

/// A workflow and how often it failed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WorkflowFailureCount {
    /// The failing workflow.
    pub workflow_id: WorkflowId,
    /// Failed executions in the window.
    pub failures: i64,
}

impl Store {
    /// Execution counts per day and status over `[from, to)`.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::Database`] on query failure.
    pub async fn status_counts_by_day(
        &self,
        tenant: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatusDayCount>> {
        let rows = sqlx::query(
            "SELECT DATE(created_at) AS day, status, COUNT(*) AS count \
             FROM executions \
             WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 \
             GROUP BY day, status ORDER BY day, status",
        )
        .bind(tenant.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| StatusDayCount {
                day: row.get("day"),
                status: row.get("status"),
                count: row.get("count"),
            })
            .collect())
    }

    /// Duration percentiles over terminal executions in `[from, to)`.
    /// Returns `None` when the window holds no finished executions.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::Database`] on query failure.
    pub async fn duration_percentiles(
        &self,
        tenant: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Option<DurationPercentiles>> {
        let row = sqlx::query(
            "SELECT \
               percentile_cont(0.5) WITHIN GROUP (ORDER BY duration_ms) AS p50, \
               percentile_cont(0.9) WITHIN GROUP (ORDER BY duration_ms) AS p90, \
               percentile_cont(0.99) WITHIN GROUP (ORDER BY duration_ms) AS p99 \
             FROM ( \
               SELECT EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000.0 AS duration_ms \
               FROM executions \
               WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 \
                 AND started_at IS NOT NULL AND completed_at IS NOT NULL \
             ) durations",
        )
        .bind(tenant.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let p50: Option<f64> = row.get("p50");
        let (Some(p50_ms), Some(p90_ms), Some(p99_ms)) =
            (p50, row.get::<Option<f64>, _>("p90"), row.get::<Option<f64>, _>("p99"))
        else {
            return Ok(None);
        };
        Ok(Some(DurationPercentiles {
            p50_ms,
            p90_ms,
            p99_ms,
        }))
    }

    /// Workflows with the most failed executions in `[from, to)`.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::Database`] on query failure.
    pub async fn top_failures(
        &self,
        tenant: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowFailureCount>> {
        let rows = sqlx::query(
            "SELECT workflow_id, COUNT(*) AS failures FROM executions \
             WHERE tenant_id = $1 AND status = 'failed' \
               AND created_at >= $2 AND created_at < $3 \
             GROUP BY workflow_id ORDER BY failures DESC LIMIT $4",
        )
        .bind(tenant.as_uuid())
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| WorkflowFailureCount {
                workflow_id: WorkflowId::from_uuid(row.get("workflow_id")),
                failures: row.get("failures"),
            })
            .collect())
    }
}
