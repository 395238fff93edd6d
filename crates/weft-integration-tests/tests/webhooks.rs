//! Webhook ingest against the full runner wiring.

use std::sync::Arc;

use serde_json::json;
use weft_core::{ExecutionStatus, WorkflowDefinition};
use weft_integration_tests::{Harness, edge, node};
use weft_triggers::{
    FilterOp, FilterRule, FilterSet, InMemoryWebhookEvents, IngestOutcome, MatchMode,
    WebhookIngestor, WebhookTrigger,
};

fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("b", "transform", json!({})),
        ],
        vec![edge("e1", "a", "b")],
    )
}

/// A matching webhook starts an execution that eventually completes, with
/// the request payload as the trigger payload.
#[tokio::test]
async fn matching_webhook_runs_the_workflow() {
    let harness = Harness::new();
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(definition());

    let ingestor = WebhookIngestor::new(
        Arc::clone(&harness.runner) as _,
        Arc::new(InMemoryWebhookEvents::new()),
    );
    let trigger = WebhookTrigger {
        id: weft_core::WebhookId::new(),
        workflow_id: workflow,
        tenant_id: tenant,
        secret: None,
        filters: FilterSet {
            mode: MatchMode::All,
            rules: vec![FilterRule {
                id: "pushes".to_owned(),
                path: "event".to_owned(),
                op: FilterOp::Eq,
                value: Some(json!("push")),
            }],
        },
        active: true,
    };

    let outcome = ingestor
        .ingest(&trigger, std::collections::HashMap::new(), br#"{"event":"push","n":3}"#)
        .await
        .unwrap();
    let IngestOutcome::Executed { execution_id, .. } = outcome else {
        panic!("expected executed outcome");
    };

    // The runner spawns the execution; wait for it to settle.
    let mut finished = None;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if let Some(execution) = harness.store.execution_of(execution_id)
            && execution.status.is_terminal()
        {
            finished = Some(execution);
            break;
        }
    }
    let finished = finished.expect("execution never finished");
    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert_eq!(finished.payload, json!({"event": "push", "n": 3}));
}

/// A quota-rejected webhook records the rejection instead of an execution.
#[tokio::test]
async fn quota_rejection_is_recorded_on_the_event() {
    let harness = Harness::new();
    let tenant = harness.tenant(0);
    let workflow = harness.save_definition(definition());

    let events = Arc::new(InMemoryWebhookEvents::new());
    let ingestor = WebhookIngestor::new(Arc::clone(&harness.runner) as _, Arc::clone(&events) as _);
    let trigger = WebhookTrigger {
        id: weft_core::WebhookId::new(),
        workflow_id: workflow,
        tenant_id: tenant,
        secret: None,
        filters: FilterSet::default(),
        active: true,
    };

    let outcome = ingestor
        .ingest(&trigger, std::collections::HashMap::new(), b"{}")
        .await
        .unwrap();
    let IngestOutcome::Rejected { reason, .. } = outcome else {
        panic!("expected rejected outcome");
    };
    assert!(reason.contains("quota exceeded"));
    assert_eq!(harness.store.execution_count(), 0);
}
