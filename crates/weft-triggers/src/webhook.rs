//! Webhook ingest.
//!
//! The HTTP layer hands over the raw body and headers; this module verifies
//! the shared-secret signature, evaluates the webhook's filters, records the
//! event, and invokes the runner. Replay re-runs the executor with a stored
//! payload and a fresh execution id.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};
use weft_core::{
    EventId, ExecutionId, ExecutionRequest, TenantId, TriggerKind, WebhookEvent, WebhookId,
    WebhookOutcome, WorkflowId,
};
use weft_engine::ExecutionRunner;

use crate::error::WebhookError;
use crate::filter::FilterSet;

type HmacSha256 = Hmac<Sha256>;

/// The signature header the ingest path checks.
const SIGNATURE_HEADER: &str = "x-signature";

/// One webhook endpoint's configuration.
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
    /// Endpoint id, part of the public URL.
    pub id: WebhookId,
    /// The workflow this endpoint starts.
    pub workflow_id: WorkflowId,
    /// The owning tenant.
    pub tenant_id: TenantId,
    /// Shared secret for HMAC verification; `None` disables verification.
    pub secret: Option<String>,
    /// Payload filters.
    pub filters: FilterSet,
    /// Whether the endpoint accepts requests.
    pub active: bool,
}

/// What happened to an ingested request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Filters matched and an execution started.
    Executed {
        /// The recorded event.
        event_id: EventId,
        /// The started execution.
        execution_id: ExecutionId,
    },
    /// No filter matched; recorded, nothing ran. Maps to
    /// `200 {skipped: true}`.
    Skipped {
        /// The recorded event.
        event_id: EventId,
    },
    /// The runner rejected the request (admission); recorded with the
    /// rejection reason.
    Rejected {
        /// The recorded event.
        event_id: EventId,
        /// Why the runner refused.
        reason: String,
    },
}

/// Durable storage for webhook events. Implemented by the store.
#[async_trait::async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Persist an event record.
    async fn record(&self, event: &WebhookEvent) -> Result<(), WebhookError>;

    /// Load an event for replay.
    async fn get(&self, id: EventId) -> Result<Option<WebhookEvent>, WebhookError>;
}

/// Process-local event records, for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryWebhookEvents {
    events: DashMap<EventId, WebhookEvent>,
}

impl InMemoryWebhookEvents {
    /// An empty record table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WebhookEventStore for InMemoryWebhookEvents {
    async fn record(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        self.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Option<WebhookEvent>, WebhookError> {
        Ok(self.events.get(&id).map(|e| e.clone()))
    }
}

/// The ingest path shared by every webhook endpoint.
pub struct WebhookIngestor {
    runner: Arc<dyn ExecutionRunner>,
    events: Arc<dyn WebhookEventStore>,
}

impl std::fmt::Debug for WebhookIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookIngestor").finish_non_exhaustive()
    }
}

impl WebhookIngestor {
    /// Wire the ingestor to the runner and event store.
    #[must_use]
    pub fn new(runner: Arc<dyn ExecutionRunner>, events: Arc<dyn WebhookEventStore>) -> Self {
        Self { runner, events }
    }

    /// Ingest one inbound request.
    ///
    /// # Errors
    ///
    /// [`WebhookError::Disabled`] for inactive endpoints and
    /// [`WebhookError::InvalidSignature`] on verification failure; neither
    /// records an event. Store failures surface as [`WebhookError::Store`].
    pub async fn ingest(
        &self,
        trigger: &WebhookTrigger,
        headers: HashMap<String, String>,
        body: &[u8],
    ) -> Result<IngestOutcome, WebhookError> {
        if !trigger.active {
            return Err(WebhookError::Disabled);
        }
        if let Some(secret) = &trigger.secret {
            verify_signature(secret, headers.get(SIGNATURE_HEADER).map(String::as_str), body)?;
        }

        let payload: Value = serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));

        let mut event = WebhookEvent::received(trigger.id, trigger.workflow_id, headers, payload);
        let hit = trigger.filters.evaluate(&event.body);
        event.matched_filters = hit.matched_rules;

        if !hit.matched {
            debug!(webhook = %trigger.id, event = %event.id, "no filter matched, skipping");
            event.outcome = WebhookOutcome::Skipped;
            self.events.record(&event).await?;
            return Ok(IngestOutcome::Skipped { event_id: event.id });
        }

        let request = ExecutionRequest {
            tenant_id: trigger.tenant_id,
            workflow_id: trigger.workflow_id,
            version: None,
            trigger: TriggerKind::Webhook,
            payload: event.body.clone(),
        };
        let outcome = match self.runner.execute(request).await {
            Ok(execution_id) => {
                info!(webhook = %trigger.id, execution = %execution_id, "webhook started execution");
                event.outcome = WebhookOutcome::Executed { execution_id };
                IngestOutcome::Executed {
                    event_id: event.id,
                    execution_id,
                }
            }
            Err(e) => {
                warn!(webhook = %trigger.id, error = %e, "runner rejected webhook request");
                event.outcome = WebhookOutcome::Rejected {
                    reason: e.to_string(),
                };
                IngestOutcome::Rejected {
                    event_id: event.id,
                    reason: e.to_string(),
                }
            }
        };
        self.events.record(&event).await?;
        Ok(outcome)
    }

    /// Re-run the executor with a stored event's payload under a fresh
    /// execution id.
    ///
    /// # Errors
    ///
    /// [`WebhookError::UnknownEvent`] if no such event exists; runner
    /// rejections surface as [`WebhookError::Store`]-free typed errors from
    /// the runner, mapped to a rejected outcome.
    pub async fn replay(
        &self,
        trigger: &WebhookTrigger,
        event_id: EventId,
    ) -> Result<IngestOutcome, WebhookError> {
        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or(WebhookError::UnknownEvent)?;

        let request = ExecutionRequest {
            tenant_id: trigger.tenant_id,
            workflow_id: event.workflow_id,
            version: None,
            trigger: TriggerKind::Webhook,
            payload: event.body.clone(),
        };
        match self.runner.execute(request).await {
            Ok(execution_id) => {
                info!(event = %event_id, execution = %execution_id, "webhook event replayed");
                Ok(IngestOutcome::Executed {
                    event_id,
                    execution_id,
                })
            }
            Err(e) => Ok(IngestOutcome::Rejected {
                event_id,
                reason: e.to_string(),
            }),
        }
    }
}

/// Constant-time verification of `sha256=<hex>` against the raw body.
fn verify_signature(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::InvalidSignature)?;
    let hex_digest = header
        .strip_prefix("sha256=")
        .ok_or(WebhookError::InvalidSignature)?;
    let claimed = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    // verify_slice is constant-time.
    mac.verify_slice(&claimed)
        .map_err(|_| WebhookError::InvalidSignature)
}
