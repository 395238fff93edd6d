//! Room name construction.
//!
//! A room is an opaque string; these helpers build the well-known forms so
//! producers and subscribers agree on the spelling.

use weft_core::{ExecutionId, TenantId, WorkflowId};

/// Room receiving every event of one execution.
#[must_use]
pub fn execution(id: ExecutionId) -> String {
    format!("execution:{id}")
}

/// Room receiving events of every execution of one workflow.
#[must_use]
pub fn workflow(id: WorkflowId) -> String {
    format!("workflow:{id}")
}

/// Room receiving events of every execution of one tenant.
#[must_use]
pub fn tenant(id: TenantId) -> String {
    format!("tenant:{id}")
}

/// Room carrying collaboration traffic for one workflow graph.
#[must_use]
pub fn collaboration(id: WorkflowId) -> String {
    format!("collaboration:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_names_are_prefixed() {
        let id = WorkflowId::new();
        assert_eq!(workflow(id), format!("workflow:{id}"));
        assert_eq!(collaboration(id), format!("collaboration:{id}"));
    }
}
