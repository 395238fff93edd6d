//! The scheduling loop and per-step lifecycle.
//!
//! Scheduling model: the frontier starts at the zero-in-degree nodes; a node
//! is dispatched once every incoming edge has resolved (delivered a value or
//! died behind an unselected branch) with at least one live delivery. Ready
//! nodes run on a bounded worker pool; simultaneous readiness breaks ties
//! lexicographically by node id so a single-worker re-run reproduces the
//! dispatch order. The execution ends when the ready queue and the in-flight
//! set are both empty.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_core::{
    Edge, EdgeId, Execution, ExecutionStatus, Node, NodeId, OnErrorPolicy, RetryPolicy, Step,
    StepStatus, WorkflowDefinition, WorkflowError, WorkflowResult,
};
use weft_events::{ExecutionBroadcaster, ExecutionEvent, ExecutionScope, StepEvent};

use crate::action::{Action, ActionContext, ActionOutput, ActionRegistry};
use crate::actions::EchoAction;
use crate::context::TemplateContext;
use crate::credential::CredentialResolver;
use crate::graph::ExecutionGraph;
use crate::runner::StepMeter;
use crate::store::{ExecutionStore, persist_with_retry};

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Max nodes executing in parallel.
    pub worker_pool_size: usize,
    /// Retry behaviour for retryable step failures.
    pub retry: RetryPolicy,
    /// Per-step timeout; `None` disables it.
    pub step_timeout: Option<Duration>,
    /// Per-execution timeout; `None` disables it.
    pub execution_timeout: Option<Duration>,
    /// Per-step output size cap in bytes.
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 8,
            retry: RetryPolicy::default(),
            step_timeout: None,
            execution_timeout: None,
            max_output_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Whether actions really run or are stubbed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Actions perform their side-effects.
    Live,
    /// Every action is replaced by a stub with `output = input`; persistence
    /// and events still occur so the traversal can be visualised.
    DryRun,
}

/// The graph executor.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<ActionRegistry>,
    credentials: Arc<dyn CredentialResolver>,
    store: Arc<dyn ExecutionStore>,
    broadcaster: ExecutionBroadcaster,
    meter: Arc<dyn StepMeter>,
    dry_stub: Arc<dyn Action>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What a finished step task hands back to the scheduler.
struct StepOutcome {
    node_id: NodeId,
    result: Result<ActionOutput, WorkflowError>,
}

/// How one incoming edge resolved.
enum EdgeResolution {
    Delivered(Value),
    Dead,
}

impl Executor {
    /// Build an executor over its contracts.
    #[must_use]
    pub fn new(
        registry: Arc<ActionRegistry>,
        credentials: Arc<dyn CredentialResolver>,
        store: Arc<dyn ExecutionStore>,
        broadcaster: ExecutionBroadcaster,
        meter: Arc<dyn StepMeter>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            credentials,
            store,
            broadcaster,
            meter,
            dry_stub: Arc::new(EchoAction),
            config,
        }
    }

    /// Run one execution to a terminal status.
    ///
    /// The returned [`Execution`] carries the terminal state; it has also
    /// been persisted and its lifecycle events emitted. `cancel` is the
    /// external cancellation token; per-execution timeouts trip a child of
    /// it.
    ///
    /// # Errors
    ///
    /// Returns an error only when the definition fails validation or the
    /// store rejects the initial `running` transition; both also mark the
    /// execution failed on a best-effort basis.
    pub async fn run(
        &self,
        mut execution: Execution,
        definition: &WorkflowDefinition,
        mode: ExecutionMode,
        cancel: CancellationToken,
    ) -> WorkflowResult<Execution> {
        let scope = ExecutionScope {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            tenant_id: execution.tenant_id,
        };

        let graph = match ExecutionGraph::build(definition) {
            Ok(graph) => graph,
            Err(e) => {
                self.finalize(&mut execution, &scope, ExecutionStatus::Failed, None, Some(&e))
                    .await;
                return Err(e);
            }
        };

        let exec_cancel = cancel.child_token();
        let watchdog = self.config.execution_timeout.map(|timeout| {
            let token = exec_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!("execution timeout reached, cancelling");
                token.cancel();
            })
        });

        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
        if let Err(e) = persist_with_retry(|| self.store.update_execution(&execution)).await {
            let err = WorkflowError::PersistenceFailed(e.to_string());
            self.finalize(&mut execution, &scope, ExecutionStatus::Failed, None, Some(&err))
                .await;
            if let Some(handle) = watchdog {
                handle.abort();
            }
            return Err(err);
        }
        self.broadcaster
            .publish(&ExecutionEvent::Started { scope })
            .await;
        info!(execution = %execution.id, workflow = %execution.workflow_id, "execution started");

        let outcome = self
            .drive(&execution, &graph, mode, scope, &exec_cancel)
            .await;
        if let Some(handle) = watchdog {
            handle.abort();
        }

        let (status, output, error) = outcome;
        self.finalize(&mut execution, &scope, status, output, error.as_ref())
            .await;
        Ok(execution)
    }

    /// The scheduling loop. Returns the terminal status, the merged sink
    /// output, and the first fatal error.
    #[allow(clippy::too_many_lines)]
    async fn drive(
        &self,
        execution: &Execution,
        graph: &ExecutionGraph,
        mode: ExecutionMode,
        scope: ExecutionScope,
        exec_cancel: &CancellationToken,
    ) -> (ExecutionStatus, Option<Value>, Option<WorkflowError>) {
        let total = graph.len();
        let pool = self.config.worker_pool_size.max(1);

        let mut remaining: HashMap<NodeId, usize> = graph
            .nodes()
            .map(|n| (n.id.clone(), graph.incoming(&n.id).len()))
            .collect();
        let mut delivered: HashMap<EdgeId, Value> = HashMap::new();
        // Nodes referenced as catch handlers only run when routed to; an
        // otherwise unconnected handler must not join the trigger frontier.
        let catch_handlers: HashSet<NodeId> = graph
            .nodes()
            .filter_map(|n| match &n.on_error {
                OnErrorPolicy::Catch(handler) => Some(handler.clone()),
                _ => None,
            })
            .collect();
        let mut ready: BTreeSet<NodeId> = graph
            .roots()
            .filter(|id| !catch_handlers.contains(id))
            .cloned()
            .collect();
        let mut to_skip: VecDeque<NodeId> = VecDeque::new();
        let mut dispatched: HashSet<NodeId> = HashSet::new();
        let mut outputs: HashMap<NodeId, Arc<Value>> = HashMap::new();
        let mut force_inputs: HashMap<NodeId, Value> = HashMap::new();
        let mut in_flight: JoinSet<StepOutcome> = JoinSet::new();
        let mut terminal_steps = 0usize;
        let mut fatal: Option<WorkflowError> = None;
        let mut cancelled = false;

        loop {
            // Resolve skip cascades before dispatching: a node whose live
            // incoming edges all died is terminal without running.
            while let Some(node_id) = to_skip.pop_front() {
                if !dispatched.insert(node_id.clone()) {
                    continue;
                }
                if let Some(node) = graph.node(&node_id) {
                    self.record_skipped(scope, node).await;
                }
                terminal_steps += 1;
                self.publish_progress(scope, total, terminal_steps).await;
                for edge in graph.outgoing(&node_id) {
                    Self::resolve_edge(
                        graph,
                        edge,
                        EdgeResolution::Dead,
                        &mut remaining,
                        &mut delivered,
                        &dispatched,
                        &mut ready,
                        &mut to_skip,
                    );
                }
            }

            let stopping = fatal.is_some() || cancelled || exec_cancel.is_cancelled();
            if stopping {
                ready.clear();
            } else {
                while in_flight.len() < pool {
                    let Some(node_id) = ready.pop_first() else {
                        break;
                    };
                    if !dispatched.insert(node_id.clone()) {
                        continue;
                    }
                    let Some(node) = graph.node(&node_id) else {
                        continue;
                    };
                    let input = Self::assemble_input(
                        graph,
                        &node_id,
                        &delivered,
                        &execution.payload,
                        force_inputs.remove(&node_id),
                    );
                    let template = TemplateContext {
                        trigger: execution.payload.clone(),
                        outputs: outputs.clone(),
                        tenant_id: execution.tenant_id,
                    };
                    let executor = self.clone();
                    let node = node.clone();
                    let step_cancel = exec_cancel.clone();
                    in_flight.spawn(async move {
                        executor
                            .run_step(scope, node, input, template, mode, step_cancel)
                            .await
                    });
                }
            }

            if in_flight.is_empty() {
                if to_skip.is_empty() && (stopping || ready.is_empty()) {
                    break;
                }
                continue;
            }

            let Some(joined) = in_flight.join_next().await else {
                continue;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "step task aborted");
                    fatal.get_or_insert(WorkflowError::ActionFatal(format!(
                        "step task aborted: {e}"
                    )));
                    continue;
                }
            };

            terminal_steps += 1;
            self.publish_progress(scope, total, terminal_steps).await;

            match outcome.result {
                Ok(output) => {
                    let data = Arc::new(output.data);
                    outputs.insert(outcome.node_id.clone(), Arc::clone(&data));
                    for edge in graph.outgoing(&outcome.node_id) {
                        let live = match &output.selected_ports {
                            None => true,
                            Some(selected) => edge
                                .source_port
                                .as_ref()
                                .is_none_or(|port| selected.contains(port)),
                        };
                        let resolution = if live {
                            EdgeResolution::Delivered((*data).clone())
                        } else {
                            EdgeResolution::Dead
                        };
                        Self::resolve_edge(
                            graph,
                            edge,
                            resolution,
                            &mut remaining,
                            &mut delivered,
                            &dispatched,
                            &mut ready,
                            &mut to_skip,
                        );
                    }
                }
                Err(err) => {
                    if matches!(err, WorkflowError::Cancelled) && exec_cancel.is_cancelled() {
                        cancelled = true;
                        continue;
                    }
                    if matches!(err, WorkflowError::PersistenceFailed(_)) {
                        fatal.get_or_insert(err);
                        continue;
                    }
                    let policy = graph
                        .node(&outcome.node_id)
                        .map_or(OnErrorPolicy::Stop, |n| n.on_error.clone());
                    match policy {
                        OnErrorPolicy::Stop => {
                            fatal.get_or_insert(err);
                        }
                        OnErrorPolicy::Continue => {
                            for edge in graph.outgoing(&outcome.node_id) {
                                Self::resolve_edge(
                                    graph,
                                    edge,
                                    EdgeResolution::Delivered(Value::Null),
                                    &mut remaining,
                                    &mut delivered,
                                    &dispatched,
                                    &mut ready,
                                    &mut to_skip,
                                );
                            }
                        }
                        OnErrorPolicy::Catch(handler) => {
                            for edge in graph.outgoing(&outcome.node_id) {
                                Self::resolve_edge(
                                    graph,
                                    edge,
                                    EdgeResolution::Dead,
                                    &mut remaining,
                                    &mut delivered,
                                    &dispatched,
                                    &mut ready,
                                    &mut to_skip,
                                );
                            }
                            if dispatched.contains(&handler) {
                                warn!(handler = %handler, "error handler already ran");
                            } else {
                                force_inputs.insert(
                                    handler.clone(),
                                    serde_json::json!({
                                        "error": err.to_string(),
                                        "kind": err.kind(),
                                        "node_id": outcome.node_id.as_str(),
                                    }),
                                );
                                to_skip.retain(|n| n != &handler);
                                ready.insert(handler);
                            }
                        }
                    }
                }
            }
        }

        // Handlers their error never routed to close out as skipped so the
        // progress counters account for every node.
        if fatal.is_none() && !cancelled && !exec_cancel.is_cancelled() {
            let unfired: Vec<NodeId> = catch_handlers
                .iter()
                .filter(|h| !dispatched.contains(*h))
                .cloned()
                .collect();
            for handler in unfired {
                dispatched.insert(handler.clone());
                if let Some(node) = graph.node(&handler) {
                    self.record_skipped(scope, node).await;
                }
                terminal_steps += 1;
                self.publish_progress(scope, total, terminal_steps).await;
            }
        }

        let was_cancelled =
            cancelled || (exec_cancel.is_cancelled() && fatal.is_none() && terminal_steps < total);
        if was_cancelled {
            (ExecutionStatus::Cancelled, None, None)
        } else if let Some(err) = fatal {
            (ExecutionStatus::Failed, None, Some(err))
        } else {
            let output = Self::merge_sink_outputs(graph, &outputs);
            (ExecutionStatus::Completed, Some(output), None)
        }
    }

    /// Resolve one edge for its target: decrement the unresolved count, and
    /// once every incoming edge has resolved, either enqueue the target or
    /// mark it for skipping when nothing was delivered.
    #[allow(clippy::too_many_arguments)]
    fn resolve_edge(
        graph: &ExecutionGraph,
        edge: &Edge,
        resolution: EdgeResolution,
        remaining: &mut HashMap<NodeId, usize>,
        delivered: &mut HashMap<EdgeId, Value>,
        dispatched: &HashSet<NodeId>,
        ready: &mut BTreeSet<NodeId>,
        to_skip: &mut VecDeque<NodeId>,
    ) {
        if let EdgeResolution::Delivered(value) = resolution {
            delivered.insert(edge.id.clone(), value);
        }
        let Some(count) = remaining.get_mut(&edge.target) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count > 0 || dispatched.contains(&edge.target) {
            return;
        }
        let any_live = graph
            .incoming(&edge.target)
            .iter()
            .any(|e| delivered.contains_key(&e.id));
        if any_live {
            ready.insert(edge.target.clone());
        } else {
            to_skip.push_back(edge.target.clone());
        }
    }

    /// Assemble a node's input from its resolved incoming edges.
    ///
    /// Port-tagged edges land under their port name; untagged deliveries
    /// flat-merge (objects by key, anything else under the producing node's
    /// id). Roots receive the trigger payload.
    fn assemble_input(
        graph: &ExecutionGraph,
        node_id: &NodeId,
        delivered: &HashMap<EdgeId, Value>,
        trigger: &Value,
        forced: Option<Value>,
    ) -> Value {
        if let Some(forced) = forced {
            return forced;
        }
        let incoming = graph.incoming(node_id);
        if incoming.is_empty() {
            return trigger.clone();
        }

        let deliveries: Vec<(&Edge, &Value)> = incoming
            .iter()
            .filter_map(|e| delivered.get(&e.id).map(|v| (e, v)))
            .collect();
        match deliveries.as_slice() {
            [] => Value::Null,
            [(edge, value)] if edge.target_port.is_none() => (*value).clone(),
            _ => {
                let mut merged = serde_json::Map::new();
                for (edge, value) in &deliveries {
                    match &edge.target_port {
                        Some(port) => {
                            merged.insert(port.clone(), (*value).clone());
                        }
                        None => match value {
                            Value::Object(map) => {
                                for (k, v) in map {
                                    merged.insert(k.clone(), v.clone());
                                }
                            }
                            other => {
                                merged.insert(edge.source.to_string(), (*other).clone());
                            }
                        },
                    }
                }
                Value::Object(merged)
            }
        }
    }

    /// One node's full step lifecycle: persist, emit, interpolate, invoke
    /// with retries, persist the terminal row, meter, emit again.
    async fn run_step(
        &self,
        scope: ExecutionScope,
        node: Node,
        input: Value,
        template: TemplateContext,
        mode: ExecutionMode,
        exec_cancel: CancellationToken,
    ) -> StepOutcome {
        let started = Instant::now();
        let mut step = Step::pending(scope.execution_id, node.id.clone(), node.node_type.clone());
        step.input = Some(input.clone());

        if let Err(e) = persist_with_retry(|| self.store.create_step(&step)).await {
            return StepOutcome {
                node_id: node.id,
                result: Err(WorkflowError::PersistenceFailed(e.to_string())),
            };
        }
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        if let Err(e) = persist_with_retry(|| self.store.update_step(&step)).await {
            return StepOutcome {
                node_id: node.id,
                result: Err(WorkflowError::PersistenceFailed(e.to_string())),
            };
        }
        self.broadcaster
            .publish(&ExecutionEvent::StepStarted {
                scope,
                step: Self::step_event(&step, None),
            })
            .await;

        let mut attempt = 1u32;
        let result: Result<ActionOutput, WorkflowError> = 'run: {
            let config = match template.interpolate(&node.config, &*self.credentials).await {
                Ok(config) => config,
                Err(e) => break 'run Err(e),
            };
            let action = match mode {
                ExecutionMode::Live => match self.registry.get(&node.node_type) {
                    Ok(action) => action,
                    Err(e) => break 'run Err(e),
                },
                ExecutionMode::DryRun => Arc::clone(&self.dry_stub),
            };

            loop {
                let ctx = ActionContext {
                    tenant_id: scope.tenant_id,
                    execution_id: scope.execution_id,
                    node_id: node.id.clone(),
                    config: config.clone(),
                    input: input.clone(),
                    cancel: exec_cancel.child_token(),
                };
                match self.invoke(&*action, ctx).await {
                    Ok(output) => {
                        let size = serde_json::to_vec(&output.data).map_or(0, |b| b.len());
                        if size > self.config.max_output_bytes {
                            break 'run Err(WorkflowError::OutputTooLarge {
                                size,
                                limit: self.config.max_output_bytes,
                            });
                        }
                        break 'run Ok(output);
                    }
                    Err(e)
                        if e.is_retryable()
                            && self.config.retry.allows_retry(attempt)
                            && !exec_cancel.is_cancelled() =>
                    {
                        let delay = self.config.retry.delay_after_attempt(attempt);
                        debug!(
                            node = %node.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying step"
                        );
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            () = exec_cancel.cancelled() => break 'run Err(WorkflowError::Cancelled),
                        }
                        attempt += 1;
                    }
                    Err(e) => break 'run Err(e),
                }
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        step.attempt = attempt;
        step.completed_at = Some(Utc::now());
        match &result {
            Ok(output) => {
                step.status = StepStatus::Completed;
                step.output = Some(output.data.clone());
            }
            Err(e) => {
                step.status = StepStatus::Failed;
                step.error = Some(e.to_string());
            }
        }

        let result = match persist_with_retry(|| self.store.update_step(&step)).await {
            Ok(()) => result,
            Err(e) => Err(WorkflowError::PersistenceFailed(e.to_string())),
        };

        self.meter.step_completed(scope.tenant_id).await;

        let event = match &result {
            Ok(_) => ExecutionEvent::StepCompleted {
                scope,
                step: Self::step_event(&step, Some(duration_ms)),
            },
            Err(_) => ExecutionEvent::StepFailed {
                scope,
                step: Self::step_event(&step, Some(duration_ms)),
            },
        };
        self.broadcaster.publish(&event).await;

        StepOutcome {
            node_id: node.id,
            result,
        }
    }

    /// Run one attempt, honouring the cancellation token and the per-step
    /// timeout; both trip the cancellation pathway.
    async fn invoke(
        &self,
        action: &dyn Action,
        ctx: ActionContext,
    ) -> WorkflowResult<ActionOutput> {
        let cancel = ctx.cancel.clone();
        let guarded = async {
            tokio::select! {
                result = action.execute(ctx) => result,
                () = cancel.cancelled() => Err(WorkflowError::Cancelled),
            }
        };
        match self.config.step_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, guarded).await {
                Ok(result) => result,
                Err(_) => Err(WorkflowError::Cancelled),
            },
            None => guarded.await,
        }
    }

    /// Persist and announce a skipped node. Best-effort: a skipped row that
    /// fails to persist is logged, not fatal.
    async fn record_skipped(&self, scope: ExecutionScope, node: &Node) {
        let mut step = Step::pending(scope.execution_id, node.id.clone(), node.node_type.clone());
        step.status = StepStatus::Skipped;
        step.completed_at = Some(Utc::now());
        if let Err(e) = persist_with_retry(|| self.store.create_step(&step)).await {
            warn!(node = %node.id, error = %e, "failed to persist skipped step");
        }
        self.broadcaster
            .publish(&ExecutionEvent::StepSkipped {
                scope,
                step: Self::step_event(&step, None),
            })
            .await;
        debug!(node = %node.id, "node skipped");
    }

    async fn publish_progress(&self, scope: ExecutionScope, total: usize, completed: usize) {
        self.broadcaster
            .publish(&ExecutionEvent::Progress {
                scope,
                total_steps: total,
                completed_steps: completed,
            })
            .await;
    }

    /// The merged outputs of the sinks that ran: a single sink's output
    /// directly, multiple sinks keyed by node id.
    fn merge_sink_outputs(graph: &ExecutionGraph, outputs: &HashMap<NodeId, Arc<Value>>) -> Value {
        let produced: Vec<(&NodeId, &Arc<Value>)> = graph
            .sinks()
            .filter_map(|id| outputs.get(id).map(|v| (id, v)))
            .collect();
        match produced.as_slice() {
            [] => Value::Null,
            [(_, value)] => (***value).clone(),
            many => Value::Object(
                many.iter()
                    .map(|(id, value)| (id.to_string(), (***value).clone()))
                    .collect(),
            ),
        }
    }

    fn step_event(step: &Step, duration_ms: Option<u64>) -> StepEvent {
        StepEvent {
            step_id: Some(step.id),
            node_id: step.node_id.clone(),
            node_type: step.node_type.clone(),
            status: step.status,
            output: step.output.clone(),
            error: step.error.clone(),
            duration_ms,
            started_at: step.started_at,
            completed_at: step.completed_at,
        }
    }

    /// Write the terminal state and emit the closing event. Best-effort on
    /// persistence; the event always goes out.
    async fn finalize(
        &self,
        execution: &mut Execution,
        scope: &ExecutionScope,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<&WorkflowError>,
    ) {
        execution.status = status;
        execution.completed_at = Some(Utc::now());
        execution.output = output;
        execution.error = error.map(ToString::to_string);
        let snapshot: &Execution = execution;
        if let Err(e) = persist_with_retry(|| self.store.update_execution(snapshot)).await {
            warn!(execution = %snapshot.id, error = %e, "failed to persist terminal execution");
        }

        let event = match status {
            ExecutionStatus::Completed => ExecutionEvent::Completed {
                scope: *scope,
                output: execution.output.clone(),
            },
            ExecutionStatus::Cancelled => ExecutionEvent::Cancelled { scope: *scope },
            _ => ExecutionEvent::Failed {
                scope: *scope,
                error: execution
                    .error
                    .clone()
                    .unwrap_or_else(|| "execution failed".to_owned()),
            },
        };
        self.broadcaster.publish(&event).await;
        info!(
            execution = %execution.id,
            status = %execution.status,
            "execution finished"
        );
    }
}
