//! Manual and API invocation.

use std::sync::Arc;

use weft_core::{ExecutionId, ExecutionRequest, TenantId, TriggerKind, WorkflowId, WorkflowResult};
use weft_engine::ExecutionRunner;

/// Synchronous entry point used by the handler layer for user-initiated and
/// API-initiated runs.
pub struct ManualTrigger {
    runner: Arc<dyn ExecutionRunner>,
}

impl std::fmt::Debug for ManualTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTrigger").finish_non_exhaustive()
    }
}

impl ManualTrigger {
    /// Wrap the runner.
    #[must_use]
    pub fn new(runner: Arc<dyn ExecutionRunner>) -> Self {
        Self { runner }
    }

    /// Start an execution on a user's behalf.
    ///
    /// # Errors
    ///
    /// Admission errors pass through from the runner.
    pub async fn invoke(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: Option<i32>,
        payload: serde_json::Value,
    ) -> WorkflowResult<ExecutionId> {
        self.runner
            .execute(ExecutionRequest {
                tenant_id,
                workflow_id,
                version,
                trigger: TriggerKind::Manual,
                payload,
            })
            .await
    }

    /// Start an execution for an API client.
    ///
    /// # Errors
    ///
    /// Admission errors pass through from the runner.
    pub async fn invoke_api(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: Option<i32>,
        payload: serde_json::Value,
    ) -> WorkflowResult<ExecutionId> {
        self.runner
            .execute(ExecutionRequest {
                tenant_id,
                workflow_id,
                version,
                trigger: TriggerKind::Api,
                payload,
            })
            .await
    }
}
