//! Executor → hub adapter.
//!
//! Each [`ExecutionEvent`] is encoded to its wire JSON exactly once and the
//! same frame is delivered to the execution, workflow, and tenant rooms.
//! Broadcasting is best-effort: a closed hub is logged, never propagated, so
//! event distribution can never fail an execution.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::event::{ExecutionEvent, StepEvent};
use crate::hub::HubHandle;
use crate::message::{ExecutionMessage, ProgressInfo, StepInfo};
use crate::room;

/// Fans executor lifecycle events out to the hub.
#[derive(Debug, Clone)]
pub struct ExecutionBroadcaster {
    hub: HubHandle,
}

impl ExecutionBroadcaster {
    /// Wrap a hub handle.
    #[must_use]
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    /// Encode `event` once and deliver it to its three rooms.
    pub async fn publish(&self, event: &ExecutionEvent) {
        let message = Self::encode(event);
        let frame: Arc<str> = match serde_json::to_string(&message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(event = event.type_name(), error = %e, "failed to encode event");
                return;
            }
        };

        let scope = event.scope();
        for room in [
            room::execution(scope.execution_id),
            room::workflow(scope.workflow_id),
            room::tenant(scope.tenant_id),
        ] {
            if self.hub.broadcast(room, Arc::clone(&frame)).await.is_err() {
                warn!(event = event.type_name(), "hub closed, dropping event");
                return;
            }
        }
    }

    fn encode(event: &ExecutionEvent) -> ExecutionMessage {
        let scope = event.scope();
        let mut message = ExecutionMessage {
            event_type: event.type_name().to_owned(),
            execution_id: scope.execution_id,
            workflow_id: scope.workflow_id,
            tenant_id: scope.tenant_id,
            status: None,
            progress: None,
            step: None,
            error: None,
            output: None,
            timestamp: Utc::now(),
        };

        match event {
            ExecutionEvent::Started { .. } => message.status = Some("running".to_owned()),
            ExecutionEvent::Completed { output, .. } => {
                message.status = Some("completed".to_owned());
                message.output.clone_from(output);
            }
            ExecutionEvent::Failed { error, .. } => {
                message.status = Some("failed".to_owned());
                message.error = Some(error.clone());
            }
            ExecutionEvent::Cancelled { .. } => message.status = Some("cancelled".to_owned()),
            ExecutionEvent::Progress {
                total_steps,
                completed_steps,
                ..
            } => message.progress = Some(ProgressInfo::new(*total_steps, *completed_steps)),
            ExecutionEvent::StepStarted { step, .. }
            | ExecutionEvent::StepCompleted { step, .. }
            | ExecutionEvent::StepFailed { step, .. }
            | ExecutionEvent::StepSkipped { step, .. } => {
                message.step = Some(Self::step_info(step));
            }
        }
        message
    }

    fn step_info(step: &StepEvent) -> StepInfo {
        StepInfo {
            step_id: step.step_id,
            node_id: step.node_id.to_string(),
            node_type: step.node_type.clone(),
            status: step.status.as_str().to_owned(),
            output_data: step.output.clone(),
            error: step.error.clone(),
            duration_ms: step.duration_ms,
            started_at: step.started_at,
            completed_at: step.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use weft_core::{ExecutionId, NodeId, StepStatus, TenantId, WorkflowId};

    use super::*;
    use crate::event::ExecutionScope;
    use crate::hub::{Hub, HubConfig};

    fn scope() -> ExecutionScope {
        ExecutionScope {
            execution_id: ExecutionId::new(),
            workflow_id: WorkflowId::new(),
            tenant_id: TenantId::new(),
        }
    }

    fn step_event(status: StepStatus) -> StepEvent {
        StepEvent {
            step_id: None,
            node_id: NodeId::new("a"),
            node_type: "transform".to_owned(),
            status,
            output: None,
            error: None,
            duration_ms: Some(3),
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn event_reaches_all_three_rooms() {
        let hub = Hub::spawn(HubConfig::default());
        let broadcaster = ExecutionBroadcaster::new(hub.clone());
        let scope = scope();

        let (exec_client, mut exec_rx) = hub.register().await.unwrap();
        let (wf_client, mut wf_rx) = hub.register().await.unwrap();
        let (tenant_client, mut tenant_rx) = hub.register().await.unwrap();
        hub.join(exec_client, room::execution(scope.execution_id))
            .await
            .unwrap();
        hub.join(wf_client, room::workflow(scope.workflow_id))
            .await
            .unwrap();
        hub.join(tenant_client, room::tenant(scope.tenant_id))
            .await
            .unwrap();

        broadcaster
            .publish(&ExecutionEvent::Started { scope })
            .await;

        for rx in [&mut exec_rx, &mut wf_rx, &mut tenant_rx] {
            let frame = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["type"], "execution.started");
            assert_eq!(value["status"], "running");
        }
    }

    #[tokio::test]
    async fn step_frames_carry_node_detail() {
        let hub = Hub::spawn(HubConfig::default());
        let broadcaster = ExecutionBroadcaster::new(hub.clone());
        let scope = scope();

        let (client, mut rx) = hub.register().await.unwrap();
        hub.join(client, room::execution(scope.execution_id))
            .await
            .unwrap();

        broadcaster
            .publish(&ExecutionEvent::StepCompleted {
                scope,
                step: step_event(StepStatus::Completed),
            })
            .await;

        let value: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["type"], "step.completed");
        assert_eq!(value["step"]["node_id"], "a");
        assert_eq!(value["step"]["status"], "completed");
        assert_eq!(value["step"]["duration_ms"], 3);
    }

    #[tokio::test]
    async fn progress_frames_carry_percentage() {
        let hub = Hub::spawn(HubConfig::default());
        let broadcaster = ExecutionBroadcaster::new(hub.clone());
        let scope = scope();

        let (client, mut rx) = hub.register().await.unwrap();
        hub.join(client, room::tenant(scope.tenant_id)).await.unwrap();

        broadcaster
            .publish(&ExecutionEvent::Progress {
                scope,
                total_steps: 4,
                completed_steps: 2,
            })
            .await;

        let value: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["progress"]["total_steps"], 4);
        assert_eq!(value["progress"]["completed_steps"], 2);
        assert!((value["progress"]["percentage"].as_f64().unwrap() - 50.0).abs() < 1e-9);
    }
}
