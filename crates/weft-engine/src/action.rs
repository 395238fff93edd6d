//! The action contract and registry.
//!
//! A node's `type` selects an action kind; the registry resolves kinds
//! deterministically and unknown kinds are a fatal step error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weft_core::{ExecutionId, NodeId, TenantId, WorkflowError, WorkflowResult};

/// Everything an action receives for one invocation.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Tenant on whose behalf the step runs.
    pub tenant_id: TenantId,
    /// The owning execution.
    pub execution_id: ExecutionId,
    /// The definition node being run.
    pub node_id: NodeId,
    /// Effective configuration, with templates already interpolated.
    pub config: serde_json::Value,
    /// Assembled input from the incoming edges.
    pub input: serde_json::Value,
    /// Tripped when the step must stop. Actions doing I/O must honour it.
    pub cancel: CancellationToken,
}

/// What an action produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    /// Output data, written to every outgoing edge.
    pub data: serde_json::Value,
    /// For control nodes: the selected outgoing ports. `None` selects every
    /// edge; unselected ports mark their edges as skipped.
    pub selected_ports: Option<Vec<String>>,
}

impl ActionOutput {
    /// Plain data output selecting every outgoing edge.
    #[must_use]
    pub const fn data(data: serde_json::Value) -> Self {
        Self {
            data,
            selected_ports: None,
        }
    }

    /// Output routed through the named ports.
    #[must_use]
    pub const fn routed(data: serde_json::Value, ports: Vec<String>) -> Self {
        Self {
            data,
            selected_ports: Some(ports),
        }
    }
}

/// One node implementation.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    /// The action kind this implementation handles.
    fn kind(&self) -> &'static str;

    /// Run the action.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::ActionRetryable`] for transient failures the
    /// executor may retry; any other variant fails the step immediately.
    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput>;
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").field("kind", &self.kind()).finish()
    }
}

/// Deterministic kind → implementation lookup.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ActionRegistry").field("kinds", &kinds).finish()
    }
}

impl ActionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in action registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for action in crate::actions::builtins() {
            registry.register(action);
        }
        registry
    }

    /// Register an implementation under its kind. Later registrations win,
    /// so deployments can override built-ins.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.kind().to_owned(), action);
    }

    /// Resolve a kind.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::ActionFatal`] naming the unknown kind.
    pub fn get(&self, kind: &str) -> WorkflowResult<Arc<dyn Action>> {
        self.actions
            .get(kind)
            .cloned()
            .ok_or_else(|| WorkflowError::ActionFatal(format!("unknown action kind: {kind}")))
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.actions.keys().cloned().collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_a_fatal_error() {
        let registry = ActionRegistry::new();
        let err = registry.get("teleport").unwrap_err();
        assert_eq!(err.kind(), "action_failed_fatal");
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn builtins_cover_the_node_catalogue() {
        let registry = ActionRegistry::with_builtins();
        for kind in ["trigger", "transform", "http", "if", "switch", "delay", "log"] {
            assert!(registry.get(kind).is_ok(), "missing builtin {kind}");
        }
    }
}
