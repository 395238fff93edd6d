//! The HTTP call node.
//!
//! Failure classification drives the retry policy: network errors, 429, and
//! 5xx are retryable; other 4xx are fatal.

use std::time::Duration;

use serde_json::{Value, json};
use weft_core::{WorkflowError, WorkflowResult};

use crate::action::{Action, ActionContext, ActionOutput};

/// Default request timeout when the node config sets none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs one HTTP request. Config (already interpolated):
///
/// ```json
/// {"method": "POST", "url": "https://...", "headers": {"k": "v"},
///  "body": <value>, "timeout_secs": 30}
/// ```
///
/// Output: `{"status": <u16>, "body": <json or string>}`.
#[derive(Debug, Clone)]
pub struct HttpAction {
    client: reqwest::Client,
}

impl HttpAction {
    /// Build with a shared client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Action for HttpAction {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn execute(&self, ctx: ActionContext) -> WorkflowResult<ActionOutput> {
        let url = ctx
            .config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::ActionFatal("http requires a url".to_owned()))?;
        let method_str = ctx
            .config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET");
        let method: reqwest::Method = method_str
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| WorkflowError::ActionFatal(format!("bad http method: {method_str}")))?;
        let timeout = ctx
            .config
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(headers) = ctx.config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(name.as_str(), v);
                }
            }
        }
        if let Some(body) = ctx.config.get("body") {
            request = request.json(body);
        }

        let response = tokio::select! {
            response = request.send() => response.map_err(classify_transport_error)?,
            () = ctx.cancel.cancelled() => return Err(WorkflowError::Cancelled),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(classify_transport_error)?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            Ok(ActionOutput::data(json!({
                "status": status.as_u16(),
                "body": body,
            })))
        } else if status.as_u16() == 429 || status.is_server_error() {
            Err(WorkflowError::ActionRetryable(format!(
                "http {status} from {url}"
            )))
        } else {
            Err(WorkflowError::ActionFatal(format!(
                "http {status} from {url}"
            )))
        }
    }
}

/// Network-level failures allow retry; timeouts count as network failures.
fn classify_transport_error(err: reqwest::Error) -> WorkflowError {
    if err.is_builder() {
        WorkflowError::ActionFatal(format!("bad http request: {err}"))
    } else {
        WorkflowError::ActionRetryable(format!("http transport error: {err}"))
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
            input: Value::Null,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn missing_url_is_fatal() {
        let err = HttpAction::new()
            .execute(ctx(json!({"method": "GET"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "action_failed_fatal");
    }

    #[tokio::test]
    async fn bad_method_is_fatal() {
        let err = HttpAction::new()
            .execute(ctx(json!({"url": "http://localhost:1", "method": "TELEPORT!"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "action_failed_fatal");
    }

    #[tokio::test]
    async fn connection_refused_is_retryable() {
        // Nothing listens on this port.
        let err = HttpAction::new()
            .execute(ctx(json!({"url": "http://127.0.0.1:9", "timeout_secs": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "action_failed_retryable");
    }
}
