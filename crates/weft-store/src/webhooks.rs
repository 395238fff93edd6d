//! Webhook event persistence.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use weft_core::{EventId, WebhookEvent, WebhookId, WorkflowId};
use weft_triggers::{WebhookError, WebhookEventStore};

use crate::db::Store;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, FromRow)]
struct WebhookEventRow {
    id: uuid::Uuid,
    webhook_id: uuid::Uuid,
    workflow_id: uuid::Uuid,
    received_at: DateTime<Utc>,
    headers: serde_json::Value,
    body: serde_json::Value,
    matched_filters: serde_json::Value,
    outcome: serde_json::Value,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = StoreError;

    fn try_from(row: WebhookEventRow) -> Result<Self, StoreError> {
        Ok(WebhookEvent {
            id: EventId::from_uuid(row.id),
            webhook_id: WebhookId::from_uuid(row.webhook_id),
            workflow_id: WorkflowId::from_uuid(row.workflow_id),
            received_at: row.received_at,
            headers: serde_json::from_value(row.headers)
                .map_err(|e| StoreError::Corrupt(format!("event headers: {e}")))?,
            body: row.body,
            matched_filters: serde_json::from_value(row.matched_filters)
                .map_err(|e| StoreError::Corrupt(format!("matched filters: {e}")))?,
            outcome: serde_json::from_value(row.outcome)
                .map_err(|e| StoreError::Corrupt(format!("event outcome: {e}")))?,
        })
    }
}

impl Store {
    pub(crate) async fn insert_webhook_event(&self, event: &WebhookEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO webhook_events \
             (id, webhook_id, workflow_id, received_at, headers, body, matched_filters, outcome) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET outcome = EXCLUDED.outcome",
        )
        .bind(event.id.as_uuid())
        .bind(event.webhook_id.as_uuid())
        .bind(event.workflow_id.as_uuid())
        .bind(event.received_at)
        .bind(serde_json::to_value(&event.headers).unwrap_or_default())
        .bind(&event.body)
        .bind(serde_json::to_value(&event.matched_filters).unwrap_or_default())
        .bind(serde_json::to_value(&event.outcome).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn fetch_webhook_event(
        &self,
        id: EventId,
    ) -> StoreResult<Option<WebhookEvent>> {
        let row = sqlx::query_as::<_, WebhookEventRow>(
            "SELECT id, webhook_id, workflow_id, received_at, headers, body, \
             matched_filters, outcome FROM webhook_events WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(WebhookEvent::try_from).transpose()
    }

    /// Recent events of one webhook endpoint, newest first.
    ///
    /// # Errors
    ///
    /// [`crate::StoreError`] on query failure or a corrupt row.
    pub async fn list_webhook_events(
        &self,
        webhook: WebhookId,
        limit: i64,
    ) -> StoreResult<Vec<WebhookEvent>> {
        let rows = sqlx::query_as::<_, WebhookEventRow>(
            "SELECT id, webhook_id, workflow_id, received_at, headers, body, \
             matched_filters, outcome FROM webhook_events \
             WHERE webhook_id = $1 ORDER BY received_at DESC LIMIT $2",
        )
        .bind(webhook.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WebhookEvent::try_from).collect()
    }
}

#[async_trait::async_trait]
impl WebhookEventStore for Store {
    async fn record(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        self.insert_webhook_event(event)
            .await
            .map_err(|e| WebhookError::Store(e.to_string()))
    }

    async fn get(&self, id: EventId) -> Result<Option<WebhookEvent>, WebhookError> {
        self.fetch_webhook_event(id)
            .await
            .map_err(|e| WebhookError::Store(e.to_string()))
    }
}
