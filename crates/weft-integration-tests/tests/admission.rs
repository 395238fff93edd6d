//! Quota admission scenarios.

use serde_json::json;
use weft_core::{WorkflowDefinition, WorkflowError};
use weft_engine::ExecutionMode;
use weft_integration_tests::{Harness, edge, node};
use weft_quota::{CounterKind, QuotaPeriod, QuotaService};

fn two_node_definition() -> WorkflowDefinition {
    WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("b", "transform", json!({})),
        ],
        vec![edge("e1", "a", "b")],
    )
}

/// Quota exceeded: with a daily limit of five and five counted executions,
/// the sixth call is rejected before any execution row exists and leaves
/// the counters unchanged.
#[tokio::test]
async fn sixth_execution_is_rejected_before_persistence() {
    let harness = Harness::new();
    let tenant = harness.tenant(5);
    let workflow = harness.save_definition(two_node_definition());

    for _ in 0..5 {
        harness
            .runner
            .execute_inline(
                harness.request(tenant, workflow, json!({})),
                ExecutionMode::Live,
            )
            .await
            .unwrap();
    }
    assert_eq!(harness.store.execution_count(), 5);

    let err = harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({})),
            ExecutionMode::Live,
        )
        .await
        .unwrap_err();
    match err {
        WorkflowError::QuotaExceeded {
            period,
            limit,
            remaining,
        } => {
            assert_eq!(period, "daily");
            assert_eq!(limit, 5);
            assert_eq!(remaining, 0);
        }
        other => panic!("unexpected error: {other}"),
    }

    // No sixth row, no sixth count.
    assert_eq!(harness.store.execution_count(), 5);
    assert_eq!(
        harness
            .quota
            .get(tenant, QuotaPeriod::Daily, CounterKind::Workflow)
            .await
            .unwrap(),
        5
    );
}

/// Suspended tenants are rejected outright.
#[tokio::test]
async fn suspended_tenant_is_rejected() {
    use weft_core::{Tenant, TenantId, TenantQuotas, TenantStatus};

    let harness = Harness::new();
    let tenant = Tenant {
        id: TenantId::new(),
        name: "mothballed".to_owned(),
        status: TenantStatus::Suspended,
        quotas: TenantQuotas::default(),
    };
    let tenant_id = tenant.id;
    harness.tenants.insert(tenant);
    let workflow = harness.save_definition(two_node_definition());

    let err = harness
        .runner
        .execute_inline(
            harness.request(tenant_id, workflow, json!({})),
            ExecutionMode::Live,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tenant_suspended");
    assert_eq!(harness.store.execution_count(), 0);
}

/// Steps are metered as they complete: a two-node run bumps the daily step
/// counter by two.
#[tokio::test]
async fn steps_are_metered_on_completion() {
    let harness = Harness::new();
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(two_node_definition());

    harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({})),
            ExecutionMode::Live,
        )
        .await
        .unwrap();

    assert_eq!(
        harness
            .quota
            .get(tenant, QuotaPeriod::Daily, CounterKind::Step)
            .await
            .unwrap(),
        2
    );
}
