//! Persistence contracts consumed by the executor and runner, plus
//! in-memory implementations for tests and single-node development.

use dashmap::DashMap;
use weft_core::{
    Execution, ExecutionId, Step, WorkflowDefinition, WorkflowError, WorkflowId, WorkflowResult,
};

/// Durable storage for executions and their steps.
///
/// Implementations map their own failures to
/// [`WorkflowError::PersistenceFailed`]; the executor retries transient
/// write failures a bounded number of times.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new execution row.
    async fn create_execution(&self, execution: &Execution) -> WorkflowResult<()>;

    /// Overwrite an execution row (status, timestamps, output, error).
    async fn update_execution(&self, execution: &Execution) -> WorkflowResult<()>;

    /// Fetch an execution.
    async fn get_execution(&self, id: ExecutionId) -> WorkflowResult<Option<Execution>>;

    /// Insert a new step row.
    async fn create_step(&self, step: &Step) -> WorkflowResult<()>;

    /// Overwrite a step row (status, attempt, output, error, timestamps).
    async fn update_step(&self, step: &Step) -> WorkflowResult<()>;

    /// All steps of an execution, in creation order.
    async fn list_steps(&self, execution_id: ExecutionId) -> WorkflowResult<Vec<Step>>;
}

/// Source of definition versions for the runner.
#[async_trait::async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Load a definition version; `None` resolves to the latest. Returns the
    /// resolved version number alongside the definition.
    async fn load_definition(
        &self,
        workflow: WorkflowId,
        version: Option<i32>,
    ) -> WorkflowResult<(i32, WorkflowDefinition)>;
}

/// Process-local execution store.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: DashMap<ExecutionId, Execution>,
    steps: DashMap<ExecutionId, Vec<Step>>,
}

impl InMemoryExecutionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of execution rows, for assertions in tests.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    /// Direct synchronous execution lookup, for assertions in tests.
    #[must_use]
    pub fn execution_of(&self, id: ExecutionId) -> Option<Execution> {
        self.executions.get(&id).map(|e| e.clone())
    }

    /// Direct synchronous step lookup, for assertions in tests.
    #[must_use]
    pub fn steps_of(&self, execution_id: ExecutionId) -> Vec<Step> {
        self.steps
            .get(&execution_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(&self, execution: &Execution) -> WorkflowResult<()> {
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> WorkflowResult<()> {
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> WorkflowResult<Option<Execution>> {
        Ok(self.executions.get(&id).map(|e| e.clone()))
    }

    async fn create_step(&self, step: &Step) -> WorkflowResult<()> {
        self.steps
            .entry(step.execution_id)
            .or_default()
            .push(step.clone());
        Ok(())
    }

    async fn update_step(&self, step: &Step) -> WorkflowResult<()> {
        let mut steps = self.steps.entry(step.execution_id).or_default();
        match steps.iter_mut().find(|s| s.id == step.id) {
            Some(slot) => {
                *slot = step.clone();
                Ok(())
            }
            None => Err(WorkflowError::PersistenceFailed(format!(
                "no step row {id}",
                id = step.id
            ))),
        }
    }

    async fn list_steps(&self, execution_id: ExecutionId) -> WorkflowResult<Vec<Step>> {
        Ok(self.steps_of(execution_id))
    }
}

/// Process-local append-only definition versions.
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    versions: DashMap<WorkflowId, Vec<WorkflowDefinition>>,
}

impl InMemoryDefinitions {
    /// An empty version store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new version; returns its 1-based number.
    pub fn save(&self, workflow: WorkflowId, definition: WorkflowDefinition) -> i32 {
        let mut versions = self.versions.entry(workflow).or_default();
        versions.push(definition);
        i32::try_from(versions.len()).unwrap_or(i32::MAX)
    }
}

#[async_trait::async_trait]
impl DefinitionSource for InMemoryDefinitions {
    async fn load_definition(
        &self,
        workflow: WorkflowId,
        version: Option<i32>,
    ) -> WorkflowResult<(i32, WorkflowDefinition)> {
        let versions = self
            .versions
            .get(&workflow)
            .ok_or_else(|| WorkflowError::InvalidDefinition(format!("unknown workflow {workflow}")))?;
        let number = match version {
            Some(v) => v,
            None => i32::try_from(versions.len()).unwrap_or(i32::MAX),
        };
        let index = usize::try_from(number - 1)
            .ok()
            .filter(|i| *i < versions.len())
            .ok_or_else(|| {
                WorkflowError::InvalidDefinition(format!("unknown version {number}"))
            })?;
        Ok((number, versions[index].clone()))
    }
}

/// Bounded retry for transient persistence failures.
pub(crate) async fn persist_with_retry<F, Fut>(mut op: F) -> WorkflowResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WorkflowResult<()>>,
{
    const ATTEMPTS: u32 = 3;
    let mut last = None;
    for attempt in 1..=ATTEMPTS {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "persistence write failed");
                last = Some(e);
                if attempt < ATTEMPTS {
                    tokio::time::sleep(std::time::Duration::from_millis(50 * u64::from(attempt)))
                        .await;
                }
            }
        }
    }
    Err(last.unwrap_or_else(|| WorkflowError::PersistenceFailed("write failed".to_owned())))
}

#[cfg(test)]
mod tests {
    use weft_core::{NodeId, TriggerKind};

    use super::*;

    #[tokio::test]
    async fn steps_update_in_place() {
        let store = InMemoryExecutionStore::new();
        let execution = Execution::pending(
            weft_core::TenantId::new(),
            WorkflowId::new(),
            1,
            TriggerKind::Manual,
            serde_json::Value::Null,
        );
        store.create_execution(&execution).await.unwrap();

        let mut step = Step::pending(execution.id, NodeId::new("a"), "transform".to_owned());
        store.create_step(&step).await.unwrap();
        step.status = weft_core::StepStatus::Completed;
        step.attempt = 2;
        store.update_step(&step).await.unwrap();

        let steps = store.list_steps(execution.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].attempt, 2);
        assert_eq!(steps[0].status, weft_core::StepStatus::Completed);
    }

    #[tokio::test]
    async fn definitions_version_from_one() {
        let defs = InMemoryDefinitions::new();
        let workflow = WorkflowId::new();
        let def = WorkflowDefinition::new(
            vec![weft_core::Node {
                id: NodeId::new("a"),
                node_type: "trigger".to_owned(),
                position: (0.0, 0.0),
                config: serde_json::Value::Null,
                on_error: weft_core::OnErrorPolicy::Stop,
            }],
            vec![],
        );
        assert_eq!(defs.save(workflow, def.clone()), 1);
        assert_eq!(defs.save(workflow, def.clone()), 2);

        let (version, loaded) = defs.load_definition(workflow, None).await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(loaded, def);
        assert!(defs.load_definition(workflow, Some(9)).await.is_err());
        assert!(defs.load_definition(WorkflowId::new(), None).await.is_err());
    }

    #[tokio::test]
    async fn persist_retry_gives_up_after_bounded_attempts() {
        let mut calls = 0u32;
        let result = persist_with_retry(|| {
            calls += 1;
            async move { Err::<(), _>(WorkflowError::PersistenceFailed("down".to_owned())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
