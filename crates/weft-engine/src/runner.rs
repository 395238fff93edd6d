//! The trigger-facing entry point.
//!
//! Triggers depend on [`ExecutionRunner::execute`] only; admission sits in
//! front of the executor behind the [`AdmissionGate`] contract, so services
//! never reach back into the engine.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use weft_core::{
    Execution, ExecutionId, ExecutionRequest, TenantId, WorkflowError, WorkflowResult,
};

use crate::executor::{ExecutionMode, Executor};
use crate::store::{DefinitionSource, ExecutionStore};

/// What triggers call to start an execution.
#[async_trait::async_trait]
pub trait ExecutionRunner: Send + Sync {
    /// Admit the request and start the execution asynchronously. Returns the
    /// execution id once the `pending` row exists.
    ///
    /// # Errors
    ///
    /// Admission errors (`quota_exceeded`, `tenant_suspended`, unknown
    /// workflow) surface before any execution row is created.
    async fn execute(&self, request: ExecutionRequest) -> WorkflowResult<ExecutionId>;
}

/// Admission check in front of the executor. Implemented by the admission
/// controller; the engine only sees the contract.
#[async_trait::async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Admit or reject a request. On admit, workflow counters have been
    /// incremented.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::QuotaExceeded`] / [`WorkflowError::TenantSuspended`]
    /// or a validation error.
    async fn admit(&self, request: &ExecutionRequest) -> WorkflowResult<()>;

    /// Return an admitted request's counter increments, for requests that
    /// fail before their execution row exists.
    async fn release(&self, tenant: TenantId);
}

/// A gate that admits everything. For tests and single-tenant deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

#[async_trait::async_trait]
impl AdmissionGate for OpenGate {
    async fn admit(&self, _request: &ExecutionRequest) -> WorkflowResult<()> {
        Ok(())
    }

    async fn release(&self, _tenant: TenantId) {}
}

/// Step-level usage metering, called as steps reach a terminal status.
/// Failures are the implementation's to swallow; metering never fails a
/// step.
#[async_trait::async_trait]
pub trait StepMeter: Send + Sync {
    /// One step of `tenant` reached a terminal status.
    async fn step_completed(&self, tenant: TenantId);
}

/// A meter that counts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMeter;

#[async_trait::async_trait]
impl StepMeter for NoopMeter {
    async fn step_completed(&self, _tenant: TenantId) {}
}

/// The production [`ExecutionRunner`]: admission, definition resolution,
/// pending-row creation, then a spawned engine run.
pub struct WorkflowRunner {
    gate: Arc<dyn AdmissionGate>,
    definitions: Arc<dyn DefinitionSource>,
    store: Arc<dyn ExecutionStore>,
    executor: Executor,
    cancellations: Arc<DashMap<ExecutionId, CancellationToken>>,
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("in_flight", &self.cancellations.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowRunner {
    /// Wire the runner to its collaborators.
    #[must_use]
    pub fn new(
        gate: Arc<dyn AdmissionGate>,
        definitions: Arc<dyn DefinitionSource>,
        store: Arc<dyn ExecutionStore>,
        executor: Executor,
    ) -> Self {
        Self {
            gate,
            definitions,
            store,
            executor,
            cancellations: Arc::new(DashMap::new()),
        }
    }

    /// Admit, persist the `pending` row, and return the ready-to-run
    /// execution with its cancellation token registered.
    async fn prepare(
        &self,
        request: &ExecutionRequest,
    ) -> WorkflowResult<(Execution, weft_core::WorkflowDefinition, CancellationToken)> {
        self.gate.admit(request).await?;

        let loaded = self
            .definitions
            .load_definition(request.workflow_id, request.version)
            .await;
        let (version, definition) = match loaded {
            Ok(v) => v,
            Err(e) => {
                self.gate.release(request.tenant_id).await;
                return Err(e);
            }
        };

        let execution = Execution::pending(
            request.tenant_id,
            request.workflow_id,
            version,
            request.trigger,
            request.payload.clone(),
        );
        if let Err(e) = self.store.create_execution(&execution).await {
            self.gate.release(request.tenant_id).await;
            return Err(WorkflowError::PersistenceFailed(e.to_string()));
        }

        let token = CancellationToken::new();
        self.cancellations.insert(execution.id, token.clone());
        Ok((execution, definition, token))
    }

    /// Run an execution to completion on the caller's task and return its
    /// terminal state. Used by dry-runs, tests, and synchronous API calls.
    pub async fn execute_inline(
        &self,
        request: ExecutionRequest,
        mode: ExecutionMode,
    ) -> WorkflowResult<Execution> {
        let (execution, definition, token) = self.prepare(&request).await?;
        let id = execution.id;
        let result = self.executor.run(execution, &definition, mode, token).await;
        self.cancellations.remove(&id);
        result
    }

    /// Trip an execution's cancellation token. Returns whether the execution
    /// was still in flight. Cancellation is asynchronous: the terminal
    /// status lands once in-flight steps acknowledge.
    pub fn cancel(&self, id: ExecutionId) -> bool {
        match self.cancellations.get(&id) {
            Some(token) => {
                info!(execution = %id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl ExecutionRunner for WorkflowRunner {
    async fn execute(&self, request: ExecutionRequest) -> WorkflowResult<ExecutionId> {
        let (execution, definition, token) = self.prepare(&request).await?;
        let id = execution.id;

        let executor = self.executor.clone();
        let cancellations_key = id;
        let runner_cancellations = Arc::clone(&self.cancellations);
        tokio::spawn(async move {
            match executor
                .run(execution, &definition, ExecutionMode::Live, token)
                .await
            {
                Ok(finished) => {
                    if finished.status == weft_core::ExecutionStatus::Failed {
                        warn!(execution = %id, error = ?finished.error, "execution failed");
                    }
                }
                Err(e) => error!(execution = %id, error = %e, "execution aborted"),
            }
            runner_cancellations.remove(&cancellations_key);
        });

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_core::{
        Edge, EdgeId, Node, NodeId, OnErrorPolicy, TriggerKind, WorkflowDefinition, WorkflowId,
    };
    use weft_events::{ExecutionBroadcaster, Hub, HubConfig};

    use super::*;
    use crate::action::ActionRegistry;
    use crate::credential::NoCredentials;
    use crate::executor::ExecutorConfig;
    use crate::store::{InMemoryDefinitions, InMemoryExecutionStore};

    fn node(id: &str, node_type: &str, config: serde_json::Value) -> Node {
        Node {
            id: NodeId::new(id),
            node_type: node_type.to_owned(),
            position: (0.0, 0.0),
            config,
            on_error: OnErrorPolicy::Stop,
        }
    }

    fn runner() -> (Arc<WorkflowRunner>, Arc<InMemoryExecutionStore>, WorkflowId) {
        let store = Arc::new(InMemoryExecutionStore::new());
        let definitions = Arc::new(InMemoryDefinitions::new());
        let workflow = WorkflowId::new();
        definitions.save(
            workflow,
            WorkflowDefinition::new(
                vec![
                    node("a", "trigger", json!({})),
                    node("b", "transform", json!({})),
                ],
                vec![Edge {
                    id: EdgeId::new("e1"),
                    source: NodeId::new("a"),
                    target: NodeId::new("b"),
                    source_port: None,
                    target_port: None,
                }],
            ),
        );

        let hub = Hub::spawn(HubConfig::default());
        let executor = Executor::new(
            Arc::new(ActionRegistry::with_builtins()),
            Arc::new(NoCredentials),
            Arc::clone(&store) as Arc<dyn ExecutionStore>,
            ExecutionBroadcaster::new(hub),
            Arc::new(NoopMeter),
            ExecutorConfig::default(),
        );
        let runner = Arc::new(WorkflowRunner::new(
            Arc::new(OpenGate),
            definitions,
            Arc::clone(&store) as Arc<dyn ExecutionStore>,
            executor,
        ));
        (runner, store, workflow)
    }

    #[tokio::test]
    async fn inline_execution_reaches_completed() {
        let (runner, store, workflow) = runner();
        let request = ExecutionRequest {
            tenant_id: TenantId::new(),
            workflow_id: workflow,
            version: None,
            trigger: TriggerKind::Manual,
            payload: json!({"x": 1}),
        };
        let finished = runner
            .execute_inline(request, ExecutionMode::Live)
            .await
            .unwrap();
        assert_eq!(finished.status, weft_core::ExecutionStatus::Completed);
        assert_eq!(finished.output, Some(json!({"x": 1})));
        assert_eq!(store.steps_of(finished.id).len(), 2);
    }

    #[tokio::test]
    async fn unknown_workflow_is_rejected_before_any_row() {
        let (runner, _store, _workflow) = runner();
        let request = ExecutionRequest {
            tenant_id: TenantId::new(),
            workflow_id: WorkflowId::new(),
            version: None,
            trigger: TriggerKind::Api,
            payload: json!({}),
        };
        let err = runner.execute(request).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_definition");
    }

    #[tokio::test]
    async fn cancel_of_unknown_execution_is_false() {
        let (runner, _store, _workflow) = runner();
        assert!(!runner.cancel(ExecutionId::new()));
    }
}
