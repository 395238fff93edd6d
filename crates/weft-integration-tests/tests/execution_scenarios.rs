//! End-to-end execution scenarios over the full wiring: admission gate,
//! executor, in-memory store, and a live hub subscriber.

use serde_json::json;
use weft_core::{ExecutionStatus, NodeId, StepStatus, WorkflowDefinition};
use weft_engine::ExecutionMode;
use weft_events::room;
use weft_integration_tests::{
    Harness, collect_until, count_events, edge, event_signature, node, ported_edge,
    progress_counters,
};

/// Linear success: three nodes in a chain, strict per-subscriber event
/// order, final output from the sink.
#[tokio::test]
async fn linear_chain_emits_ordered_lifecycle() {
    let harness = Harness::new();
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("b", "transform", json!({})),
            node("c", "transform", json!({})),
        ],
        vec![edge("e1", "a", "b"), edge("e2", "b", "c")],
    ));
    let mut subscriber = harness.subscribe(room::workflow(workflow)).await;

    let finished = harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({"x": 1})),
            ExecutionMode::Live,
        )
        .await
        .unwrap();

    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert_eq!(finished.output, Some(json!({"x": 1})));

    let frames = collect_until(&mut subscriber, "execution.completed").await;
    assert_eq!(
        event_signature(&frames),
        vec![
            "execution.started",
            "step.started(a)",
            "step.completed(a)",
            "step.started(b)",
            "step.completed(b)",
            "step.started(c)",
            "step.completed(c)",
            "execution.completed",
        ]
    );
}

/// Conditional skip: the unselected branch terminates as `skipped` without
/// ever running, and the join below it runs exactly once.
#[tokio::test]
async fn conditional_skips_the_unselected_branch() {
    let harness = Harness::new();
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("gate", "if", json!({"condition": "{{trigger.go}}"})),
            node("left", "transform", json!({})),
            node("right", "transform", json!({})),
            node("sink", "transform", json!({})),
        ],
        vec![
            edge("e1", "a", "gate"),
            ported_edge("e2", "gate", "left", "true"),
            ported_edge("e3", "gate", "right", "false"),
            edge("e4", "left", "sink"),
            edge("e5", "right", "sink"),
        ],
    ));
    let mut subscriber = harness.subscribe(room::workflow(workflow)).await;

    let finished = harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({"go": true})),
            ExecutionMode::Live,
        )
        .await
        .unwrap();

    assert_eq!(finished.status, ExecutionStatus::Completed);
    let steps = harness.store.steps_of(finished.id);
    let right = steps
        .iter()
        .find(|s| s.node_id == NodeId::new("right"))
        .unwrap();
    assert_eq!(right.status, StepStatus::Skipped);
    assert!(right.started_at.is_none());
    assert_eq!(
        steps
            .iter()
            .filter(|s| s.node_id == NodeId::new("sink"))
            .count(),
        1
    );

    let frames = collect_until(&mut subscriber, "execution.completed").await;
    // The skipped node never starts.
    assert_eq!(count_events(&frames, "step.started", "right"), 0);
    assert_eq!(count_events(&frames, "step.skipped", "right"), 1);
    // Every reachable node shows up terminally exactly once.
    let terminals: usize = ["a", "gate", "left", "sink"]
        .iter()
        .map(|n| count_events(&frames, "step.completed", n))
        .sum();
    assert_eq!(terminals + 1, 5);
}

/// Parallel fan-out: three branches feed a join; events interleave freely
/// but each branch starts before it completes, the join waits for all
/// three, and progress counters never decrease.
#[tokio::test]
async fn parallel_fanout_joins_and_reports_monotone_progress() {
    let harness = Harness::new();
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("p1", "transform", json!({"template": {"p1": 1}})),
            node("p2", "transform", json!({"template": {"p2": 2}})),
            node("p3", "transform", json!({"template": {"p3": 3}})),
            node("zjoin", "transform", json!({})),
        ],
        vec![
            edge("e1", "a", "p1"),
            edge("e2", "a", "p2"),
            edge("e3", "a", "p3"),
            edge("e4", "p1", "zjoin"),
            edge("e5", "p2", "zjoin"),
            edge("e6", "p3", "zjoin"),
        ],
    ));
    let mut subscriber = harness.subscribe(room::workflow(workflow)).await;

    let finished = harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({})),
            ExecutionMode::Live,
        )
        .await
        .unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);
    assert_eq!(finished.output, Some(json!({"p1": 1, "p2": 2, "p3": 3})));

    let frames = collect_until(&mut subscriber, "execution.completed").await;
    let signature = event_signature(&frames);
    for branch in ["p1", "p2", "p3"] {
        let started = signature
            .iter()
            .position(|e| e == &format!("step.started({branch})"))
            .unwrap();
        let completed = signature
            .iter()
            .position(|e| e == &format!("step.completed({branch})"))
            .unwrap();
        assert!(started < completed);
        // The join starts only after every branch completed.
        let join_started = signature
            .iter()
            .position(|e| e == "step.started(zjoin)")
            .unwrap();
        assert!(completed < join_started);
    }

    let counters = progress_counters(&frames);
    assert!(counters.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(counters.last().unwrap(), &(5, 5));
}

/// Retry then success: one retryable failure, a single step row at
/// attempt 2, and no `step.failed` for the final outcome.
#[tokio::test]
async fn retry_then_success_keeps_one_step_row() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use weft_core::{WorkflowError, WorkflowResult};
    use weft_engine::{Action, ActionContext, ActionOutput, ActionRegistry, ExecutorConfig};

    struct FailsOnce {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Action for FailsOnce {
        fn kind(&self) -> &'static str {
            "fails-once"
        }

        async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(WorkflowError::ActionRetryable("first attempt".to_owned()))
            } else {
                Ok(ActionOutput::data(ctx.input))
            }
        }
    }

    let mut registry = ActionRegistry::with_builtins();
    registry.register(Arc::new(FailsOnce {
        calls: AtomicU32::new(0),
    }));
    let config = ExecutorConfig {
        retry: weft_core::RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(10),
            max_delay: std::time::Duration::from_millis(40),
        },
        ..ExecutorConfig::default()
    };
    let harness = Harness::with_registry(registry, config);
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("b", "fails-once", json!({})),
        ],
        vec![edge("e1", "a", "b")],
    ));
    let mut subscriber = harness.subscribe(room::workflow(workflow)).await;

    let finished = harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({})),
            ExecutionMode::Live,
        )
        .await
        .unwrap();
    assert_eq!(finished.status, ExecutionStatus::Completed);

    let steps = harness.store.steps_of(finished.id);
    let rows: Vec<_> = steps
        .iter()
        .filter(|s| s.node_id == NodeId::new("b"))
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, StepStatus::Completed);
    assert_eq!(rows[0].attempt, 2);

    let frames = collect_until(&mut subscriber, "execution.completed").await;
    assert_eq!(count_events(&frames, "step.started", "b"), 1);
    assert_eq!(count_events(&frames, "step.completed", "b"), 1);
    assert_eq!(count_events(&frames, "step.failed", "b"), 0);
}

/// Dry-run: stubs replace actions, both branches of a conditional run, and
/// steps still persist for visualisation.
#[tokio::test]
async fn dry_run_visualises_the_whole_graph() {
    let harness = Harness::new();
    let tenant = harness.tenant(-1);
    let workflow = harness.save_definition(WorkflowDefinition::new(
        vec![
            node("a", "trigger", json!({})),
            node("gate", "if", json!({"condition": false})),
            node("left", "http", json!({"url": "https://nowhere.invalid"})),
            node("right", "transform", json!({})),
        ],
        vec![
            edge("e1", "a", "gate"),
            ported_edge("e2", "gate", "left", "true"),
            ported_edge("e3", "gate", "right", "false"),
        ],
    ));

    let finished = harness
        .runner
        .execute_inline(
            harness.request(tenant, workflow, json!({"seed": 1})),
            ExecutionMode::DryRun,
        )
        .await
        .unwrap();

    assert_eq!(finished.status, ExecutionStatus::Completed);
    let steps = harness.store.steps_of(finished.id);
    assert_eq!(steps.len(), 4);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
}
