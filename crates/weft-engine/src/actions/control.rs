//! Control-flow nodes: `if` and `switch`.
//!
//! Control nodes pass their input through and select a subset of outgoing
//! ports; edges on unselected ports are skipped by the scheduler.

use serde_json::Value;
use weft_core::{WorkflowError, WorkflowResult};

use crate::action::{Action, ActionContext, ActionOutput};

/// Two-way branch. Config: `{"condition": <value>}` (already interpolated);
/// selects port `"true"` or `"false"` by JSON truthiness.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfAction;

/// JSON truthiness: `false`, `null`, `0`, `""`, `[]`, and `{}` are falsy.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[async_trait::async_trait]
impl Action for IfAction {
    fn kind(&self) -> &'static str {
        "if"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        let condition = ctx.config.get("condition").ok_or_else(|| {
            WorkflowError::ActionFatal("if requires a condition".to_owned())
        })?;
        let port = if truthy(condition) { "true" } else { "false" };
        Ok(ActionOutput::routed(ctx.input, vec![port.to_owned()]))
    }
}

/// Multi-way branch. Config:
///
/// ```json
/// {"value": <value>, "cases": [{"equals": <value>, "port": "a"}, ...], "default": "other"}
/// ```
///
/// The first case whose `equals` matches selects its port; otherwise the
/// `default` port if present, otherwise no port (every outgoing edge skips).
#[derive(Debug, Default, Clone, Copy)]
pub struct SwitchAction;

#[async_trait::async_trait]
impl Action for SwitchAction {
    fn kind(&self) -> &'static str {
        "switch"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        let value = ctx
            .config
            .get("value")
            .ok_or_else(|| WorkflowError::ActionFatal("switch requires a value".to_owned()))?;
        let cases = ctx
            .config
            .get("cases")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                WorkflowError::ActionFatal("switch requires a cases array".to_owned())
            })?;

        for case in cases {
            let matches = case.get("equals").is_some_and(|expected| expected == value);
            if matches {
                let port = case.get("port").and_then(Value::as_str).ok_or_else(|| {
                    WorkflowError::ActionFatal("switch case is missing a port".to_owned())
                })?;
                return Ok(ActionOutput::routed(ctx.input, vec![port.to_owned()]));
            }
        }

        let ports = ctx
            .config
            .get("default")
            .and_then(Value::as_str)
            .map(|p| vec![p.to_owned()])
            .unwrap_or_default();
        Ok(ActionOutput::routed(ctx.input, ports))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use weft_core::{ExecutionId, NodeId, TenantId};

    use super::*;

    fn ctx(config: Value) -> ActionContext {
        ActionContext {
            tenant_id: TenantId::new(),
            execution_id: ExecutionId::new(),
            node_id: NodeId::new("n"),
            config,
            input: json!({"carried": true}),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn if_selects_by_truthiness() {
        let out = IfAction.execute(ctx(json!({"condition": true}))).await.unwrap();
        assert_eq!(out.selected_ports, Some(vec!["true".to_owned()]));
        assert_eq!(out.data, json!({"carried": true}));

        let out = IfAction.execute(ctx(json!({"condition": 0}))).await.unwrap();
        assert_eq!(out.selected_ports, Some(vec!["false".to_owned()]));

        let out = IfAction
            .execute(ctx(json!({"condition": "nonempty"})))
            .await
            .unwrap();
        assert_eq!(out.selected_ports, Some(vec!["true".to_owned()]));
    }

    #[tokio::test]
    async fn if_without_condition_is_fatal() {
        let err = IfAction.execute(ctx(json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), "action_failed_fatal");
    }

    #[tokio::test]
    async fn switch_matches_first_case() {
        let config = json!({
            "value": "beta",
            "cases": [
                {"equals": "alpha", "port": "a"},
                {"equals": "beta", "port": "b"},
            ],
            "default": "other",
        });
        let out = SwitchAction.execute(ctx(config)).await.unwrap();
        assert_eq!(out.selected_ports, Some(vec!["b".to_owned()]));
    }

    #[tokio::test]
    async fn switch_falls_back_to_default_then_nothing() {
        let with_default = json!({
            "value": 42,
            "cases": [{"equals": 1, "port": "one"}],
            "default": "other",
        });
        let out = SwitchAction.execute(ctx(with_default)).await.unwrap();
        assert_eq!(out.selected_ports, Some(vec!["other".to_owned()]));

        let without_default = json!({
            "value": 42,
            "cases": [{"equals": 1, "port": "one"}],
        });
        let out = SwitchAction.execute(ctx(without_default)).await.unwrap();
        assert_eq!(out.selected_ports, Some(vec![]));
    }
}
