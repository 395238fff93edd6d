//! Trigger error types.

/// Errors from webhook ingest.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The `X-Signature` header is missing or does not match the body.
    /// Maps to HTTP 401 at the transport layer.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// The webhook endpoint is disabled.
    #[error("webhook is disabled")]
    Disabled,

    /// The referenced event does not exist (replay).
    #[error("unknown webhook event")]
    UnknownEvent,

    /// Persisting or loading the event record failed.
    #[error("event store error: {0}")]
    Store(String),
}

/// Errors from schedule parsing and management.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The cron expression does not parse.
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidExpression {
        /// The rejected expression.
        expression: String,
        /// Parser detail.
        reason: String,
    },

    /// The timezone name is unknown.
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
}
