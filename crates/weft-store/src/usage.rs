//! AI usage log persistence and aggregation.

use chrono::{DateTime, Utc};
use sqlx::Row;
use weft_core::TenantId;
use weft_quota::{AiUsageRecord, AiUsageReport, AiUsageSink, ModelUsage, QuotaError, QuotaResult};

use crate::db::Store;
use crate::error::StoreResult;

impl Store {
    pub(crate) async fn insert_usage_records(
        &self,
        records: &[AiUsageRecord],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO ai_usage_log \
                 (tenant_id, provider, model, action, tokens_in, tokens_out, success, \
                  error_code, latency_ms, estimated_cost_cents, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(record.tenant_id.as_uuid())
            .bind(&record.provider)
            .bind(&record.model)
            .bind(&record.action)
            .bind(record.tokens_in)
            .bind(record.tokens_out)
            .bind(record.success)
            .bind(&record.error_code)
            .bind(record.latency_ms)
            .bind(record.estimated_cost_cents)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Per-model usage totals over `[from, to)`.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError::Database`] on query failure.
    pub async fn get_usage(
        &self,
        tenant: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<AiUsageReport> {
        let rows = sqlx::query(
            "SELECT provider, model, COUNT(*) AS calls, \
               COALESCE(SUM(tokens_in), 0) AS tokens_in, \
               COALESCE(SUM(tokens_out), 0) AS tokens_out, \
               COALESCE(SUM(estimated_cost_cents), 0) AS cost_cents \
             FROM ai_usage_log \
             WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 \
             GROUP BY provider, model ORDER BY cost_cents DESC",
        )
        .bind(tenant.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(AiUsageReport {
            per_model: rows
                .into_iter()
                .map(|row| ModelUsage {
                    provider: row.get("provider"),
                    model: row.get("model"),
                    calls: row.get("calls"),
                    tokens_in: row.get("tokens_in"),
                    tokens_out: row.get("tokens_out"),
                    cost_cents: row.get("cost_cents"),
                })
                .collect(),
        })
    }
}

#[async_trait::async_trait]
impl AiUsageSink for Store {
    async fn append(&self, records: &[AiUsageRecord]) -> QuotaResult<()> {
        self.insert_usage_records(records)
            .await
            .map_err(|e| QuotaError::Sink(e.to_string()))
    }
}
