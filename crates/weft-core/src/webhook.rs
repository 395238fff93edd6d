//! Immutable records of inbound webhook events.
//!
//! Every accepted request on a webhook endpoint is recorded before the
//! executor is invoked, so events can be inspected and replayed later.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventId, ExecutionId, WebhookId, WorkflowId};

/// What happened to an inbound webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WebhookOutcome {
    /// Filters matched and the executor was invoked.
    Executed {
        /// The execution that was started.
        execution_id: ExecutionId,
    },
    /// No filter matched; the event was recorded but nothing ran.
    Skipped,
    /// The executor rejected the request (admission or validation).
    Rejected {
        /// The rejection reason.
        reason: String,
    },
}

/// An immutable record of one inbound trigger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event id.
    pub id: EventId,
    /// The webhook endpoint that received the request.
    pub webhook_id: WebhookId,
    /// The workflow the webhook is attached to.
    pub workflow_id: WorkflowId,
    /// When the request arrived.
    pub received_at: DateTime<Utc>,
    /// Request headers, lower-cased keys.
    pub headers: HashMap<String, String>,
    /// Parsed request body.
    pub body: serde_json::Value,
    /// Ids of the filter rules that matched.
    pub matched_filters: Vec<String>,
    /// What happened to the event.
    pub outcome: WebhookOutcome,
}

impl WebhookEvent {
    /// Record a freshly received event with an undecided outcome of
    /// [`WebhookOutcome::Skipped`]; the ingest path overwrites the outcome
    /// once filters and admission have run.
    #[must_use]
    pub fn received(
        webhook_id: WebhookId,
        workflow_id: WorkflowId,
        headers: HashMap<String, String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            webhook_id,
            workflow_id,
            received_at: Utc::now(),
            headers,
            body,
            matched_filters: Vec::new(),
            outcome: WebhookOutcome::Skipped,
        }
    }
}
