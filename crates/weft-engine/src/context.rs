//! Template interpolation over the execution context.
//!
//! Node configuration may embed `{{expr}}` expressions resolved against the
//! trigger payload (`trigger.path`), upstream outputs (`node.<id>.path`),
//! and tenant-scoped secrets (`secrets.<name>`). A string that is exactly
//! one expression keeps the resolved value's JSON type; expressions embedded
//! in longer strings are stringified in place. Any resolution failure is
//! fatal for the step.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use weft_core::{NodeId, TenantId, WorkflowError, WorkflowResult};

use crate::credential::CredentialResolver;

/// The values `{{expr}}` expressions resolve against.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    /// The execution's trigger payload.
    pub trigger: Value,
    /// Outputs of completed upstream nodes.
    pub outputs: HashMap<NodeId, Arc<Value>>,
    /// Tenant whose secrets are in scope.
    pub tenant_id: TenantId,
}

impl TemplateContext {
    /// Interpolate every string in `value`, recursively.
    pub async fn interpolate(
        &self,
        value: &Value,
        credentials: &dyn CredentialResolver,
    ) -> WorkflowResult<Value> {
        match value {
            Value::String(s) => self.interpolate_string(s, credentials).await,
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Box::pin(self.interpolate(item, credentials)).await?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(
                        key.clone(),
                        Box::pin(self.interpolate(item, credentials)).await?,
                    );
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    async fn interpolate_string(
        &self,
        input: &str,
        credentials: &dyn CredentialResolver,
    ) -> WorkflowResult<Value> {
        // Fast path: a string that is exactly one expression keeps the
        // resolved value's type.
        if let Some(expr) = single_expression(input) {
            return self.resolve(expr, credentials).await;
        }

        let mut result = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            let Some(end) = rest[start..].find("}}") else {
                return Err(WorkflowError::InterpolationFailed {
                    expression: rest[start..].to_owned(),
                    reason: "unterminated template expression".to_owned(),
                });
            };
            result.push_str(&rest[..start]);
            let expr = rest[start + 2..start + end].trim();
            let resolved = self.resolve(expr, credentials).await?;
            match resolved {
                Value::String(s) => result.push_str(&s),
                other => result.push_str(&other.to_string()),
            }
            rest = &rest[start + end + 2..];
        }
        result.push_str(rest);
        Ok(Value::String(result))
    }

    async fn resolve(
        &self,
        expr: &str,
        credentials: &dyn CredentialResolver,
    ) -> WorkflowResult<Value> {
        let fail = |reason: &str| WorkflowError::InterpolationFailed {
            expression: expr.to_owned(),
            reason: reason.to_owned(),
        };

        let (root, path) = match expr.split_once('.') {
            Some((root, path)) => (root, Some(path)),
            None => (expr, None),
        };

        match root {
            "trigger" => lookup_path(&self.trigger, path.unwrap_or(""))
                .ok_or_else(|| fail("path not found in trigger payload")),
            "node" => {
                let rest = path.ok_or_else(|| fail("expected node.<id>"))?;
                let (id, node_path) = match rest.split_once('.') {
                    Some((id, p)) => (id, p),
                    None => (rest, ""),
                };
                let output = self
                    .outputs
                    .get(&NodeId::new(id))
                    .ok_or_else(|| fail("no output for that node"))?;
                lookup_path(output, node_path).ok_or_else(|| fail("path not found in node output"))
            }
            "secrets" => {
                let name = path.ok_or_else(|| fail("expected secrets.<name>"))?;
                let bytes = credentials.resolve(self.tenant_id, name).await?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| fail("credential is not valid UTF-8"))?;
                Ok(Value::String(text))
            }
            _ => Err(fail("unknown expression root")),
        }
    }
}

/// If `input` is exactly `{{ expr }}`, return the inner expression.
fn single_expression(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    // Reject strings holding more than one expression.
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Walk a dotted path. Empty path returns the value itself; numeric segments
/// index into arrays.
fn lookup_path(value: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}
