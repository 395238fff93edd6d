//! Structural actions: trigger entry, transform, echo, delay, log.

use serde_json::Value;
use tracing::info;
use weft_core::{WorkflowError, WorkflowResult};

use crate::action::{Action, ActionContext, ActionOutput};

/// Entry-point node: passes the trigger payload through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerAction;

#[async_trait::async_trait]
impl Action for TriggerAction {
    fn kind(&self) -> &'static str {
        "trigger"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        Ok(ActionOutput::data(ctx.input))
    }
}

/// Shapes data. With a `template` in the config (already interpolated), the
/// template becomes the output; without one, the input passes through.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformAction;

#[async_trait::async_trait]
impl Action for TransformAction {
    fn kind(&self) -> &'static str {
        "transform"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        let output = match ctx.config.get("template") {
            Some(template) => template.clone(),
            None => ctx.input,
        };
        Ok(ActionOutput::data(output))
    }
}

/// The dry-run stub: `output = input`, no side-effects, no port selection,
/// so a dry-run traverses every branch.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAction;

#[async_trait::async_trait]
impl Action for EchoAction {
    fn kind(&self) -> &'static str {
        "echo"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        Ok(ActionOutput::data(ctx.input))
    }
}

/// Cancellable pause. Config: `{"duration_ms": <u64>}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayAction;

#[async_trait::async_trait]
impl Action for DelayAction {
    fn kind(&self) -> &'static str {
        "delay"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        let millis = ctx
            .config
            .get("duration_ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                WorkflowError::ActionFatal("delay requires a numeric duration_ms".to_owned())
            })?;
        tokio::select! {
            () = tokio::time::sleep(std::time::Duration::from_millis(millis)) => {
                Ok(ActionOutput::data(ctx.input))
            }
            () = ctx.cancel.cancelled() => Err(WorkflowError::Cancelled),
        }
    }
}

/// Emits a log line on the execution's behalf. Config:
/// `{"message": <string>}`; the input passes through.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAction;

#[async_trait::async_trait]
impl Action for LogAction {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        let message = ctx
            .config
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("");
        info!(
            execution = %ctx.execution_id,
            node = %ctx.node_id,
            message,
            "workflow log node"
        );
        Ok(ActionOutput::data(ctx.input))
    }
}
