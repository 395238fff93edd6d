//! Built-in node implementations.
//!
//! Integration-specific actions (S3, Slack, ...) are registered by the
//! deployment; the engine ships the structural catalogue: trigger entry
//! points, control flow, transforms, HTTP calls, and utilities.

mod basic;
mod control;
mod http;

use std::sync::Arc;

pub use basic::{DelayAction, EchoAction, LogAction, TransformAction, TriggerAction};
pub use control::{IfAction, SwitchAction};
pub use http::HttpAction;

use crate::action::Action;

/// Every built-in action, for [`crate::ActionRegistry::with_builtins`].
#[must_use]
pub fn builtins() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(TriggerAction),
        Arc::new(TransformAction),
        Arc::new(EchoAction),
        Arc::new(DelayAction),
        Arc::new(LogAction),
        Arc::new(IfAction),
        Arc::new(SwitchAction),
        Arc::new(HttpAction::new()),
    ]
}
