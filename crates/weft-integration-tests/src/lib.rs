//! End-to-end test harness wiring every subsystem against in-memory
//! collaborators and a real hub.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![allow(clippy::unwrap_used, missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use weft_admission::{AdmissionController, InMemoryTenants};
use weft_core::{
    Edge, EdgeId, ExecutionRequest, Node, NodeId, OnErrorPolicy, Tenant, TenantId, TenantQuotas,
    TenantStatus, TriggerKind, WorkflowDefinition, WorkflowId,
};
use weft_engine::{
    ActionRegistry, Executor, ExecutorConfig, InMemoryDefinitions, InMemoryExecutionStore,
    NoCredentials, WorkflowRunner,
};
use weft_events::{ExecutionBroadcaster, Hub, HubConfig, HubHandle};
use weft_quota::InMemoryQuota;

/// Everything a scenario needs, wired the way production wires it: the
/// admission controller is both the runner's gate and the executor's step
/// meter.
pub struct Harness {
    pub hub: HubHandle,
    pub store: Arc<InMemoryExecutionStore>,
    pub definitions: Arc<InMemoryDefinitions>,
    pub quota: Arc<InMemoryQuota>,
    pub tenants: Arc<InMemoryTenants>,
    pub runner: Arc<WorkflowRunner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registry(ActionRegistry::with_builtins(), ExecutorConfig::default())
    }

    pub fn with_registry(registry: ActionRegistry, config: ExecutorConfig) -> Self {
        let hub = Hub::spawn(HubConfig::default());
        let store = Arc::new(InMemoryExecutionStore::new());
        let definitions = Arc::new(InMemoryDefinitions::new());
        let quota = Arc::new(InMemoryQuota::new());
        let tenants = Arc::new(InMemoryTenants::new());
        let controller = Arc::new(AdmissionController::new(
            Arc::clone(&tenants) as _,
            Arc::clone(&quota) as _,
        ));

        let executor = Executor::new(
            Arc::new(registry),
            Arc::new(NoCredentials),
            Arc::clone(&store) as _,
            ExecutionBroadcaster::new(hub.clone()),
            Arc::clone(&controller) as _,
            config,
        );
        let runner = Arc::new(WorkflowRunner::new(
            Arc::clone(&controller) as _,
            Arc::clone(&definitions) as _,
            Arc::clone(&store) as _,
            executor,
        ));

        Self {
            hub,
            store,
            definitions,
            quota,
            tenants,
            runner,
        }
    }

    /// Register an active tenant with the given daily workflow limit
    /// (`-1` = unlimited).
    pub fn tenant(&self, daily_workflow_limit: i64) -> TenantId {
        let tenant = Tenant {
            id: TenantId::new(),
            name: "scenario".to_owned(),
            status: TenantStatus::Active,
            quotas: TenantQuotas {
                daily_workflow_limit,
                monthly_workflow_limit: -1,
                daily_step_limit: -1,
            },
        };
        let id = tenant.id;
        self.tenants.insert(tenant);
        id
    }

    pub fn save_definition(&self, definition: WorkflowDefinition) -> WorkflowId {
        let workflow = WorkflowId::new();
        self.definitions.save(workflow, definition);
        workflow
    }

    /// Subscribe a client to one room.
    pub async fn subscribe(&self, room: String) -> mpsc::Receiver<Arc<str>> {
        let (client, rx) = self.hub.register().await.unwrap();
        self.hub.join(client, room).await.unwrap();
        rx
    }

    pub fn request(&self, tenant: TenantId, workflow: WorkflowId, payload: Value) -> ExecutionRequest {
        ExecutionRequest {
            tenant_id: tenant,
            workflow_id: workflow,
            version: None,
            trigger: TriggerKind::Manual,
            payload,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn node(id: &str, node_type: &str, config: Value) -> Node {
    Node {
        id: NodeId::new(id),
        node_type: node_type.to_owned(),
        position: (0.0, 0.0),
        config,
        on_error: OnErrorPolicy::Stop,
    }
}

pub fn edge(id: &str, source: &str, target: &str) -> Edge {
    Edge {
        id: EdgeId::new(id),
        source: NodeId::new(source),
        target: NodeId::new(target),
        source_port: None,
        target_port: None,
    }
}

pub fn ported_edge(id: &str, source: &str, target: &str, port: &str) -> Edge {
    Edge {
        source_port: Some(port.to_owned()),
        ..edge(id, source, target)
    }
}

/// Drain frames from a subscriber until a frame of `final_type` arrives.
/// Panics if it takes longer than five seconds.
pub async fn collect_until(rx: &mut mpsc::Receiver<Arc<str>>, final_type: &str) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event stream")
            .expect("hub dropped the subscriber");
        let value: Value = serde_json::from_str(&frame).unwrap();
        let frame_type = value["type"].as_str().unwrap_or_default().to_owned();
        frames.push(value);
        if frame_type == final_type {
            return frames;
        }
    }
}

/// The `type` values of the given frames, with `execution.progress` frames
/// filtered out, keyed where useful by node id.
pub fn event_signature(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .filter(|f| f["type"] != "execution.progress")
        .map(|f| {
            let t = f["type"].as_str().unwrap_or_default();
            match f.get("step").and_then(|s| s.get("node_id")).and_then(Value::as_str) {
                Some(node) => format!("{t}({node})"),
                None => t.to_owned(),
            }
        })
        .collect()
}

/// Per-node count of events of one type.
pub fn count_events(frames: &[Value], event_type: &str, node: &str) -> usize {
    frames
        .iter()
        .filter(|f| f["type"] == event_type && f["step"]["node_id"] == node)
        .count()
}

/// All `execution.progress` counters in arrival order.
pub fn progress_counters(frames: &[Value]) -> Vec<(u64, u64)> {
    frames
        .iter()
        .filter(|f| f["type"] == "execution.progress")
        .map(|f| {
            (
                f["progress"]["completed_steps"].as_u64().unwrap(),
                f["progress"]["total_steps"].as_u64().unwrap(),
            )
        })
        .collect()
}

/// A headers map for webhook scenarios.
pub fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}
