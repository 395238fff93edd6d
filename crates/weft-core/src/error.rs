//! The error taxonomy surfaced by the execution core.
//!
//! Every failure a step or an admission check can produce maps to exactly one
//! variant here. The stable [`kind`](WorkflowError::kind) codes are what gets
//! persisted on step rows and emitted on the event stream.

use crate::definition::DefinitionError;
use crate::types::TenantId;

/// Result alias for core operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors surfaced by the execution core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// The definition failed structural validation.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// A template referenced a credential the tenant does not have.
    #[error("unknown credential: {name}")]
    UnknownCredential {
        /// The credential name that could not be resolved.
        name: String,
    },

    /// The credential service failed to decrypt a stored credential.
    #[error("credential decrypt failed: {name}")]
    CredentialDecryptFailed {
        /// The credential that could not be decrypted.
        name: String,
    },

    /// A `{{expr}}` template referenced a missing path.
    #[error("interpolation failed: {expression}: {reason}")]
    InterpolationFailed {
        /// The template expression that failed.
        expression: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A transient action failure that allows retry (network errors, 5xx,
    /// rate limits, timeouts).
    #[error("action failed (retryable): {0}")]
    ActionRetryable(String),

    /// A permanent action failure (4xx other than rate-limit, validation,
    /// permission, unknown action kind).
    #[error("action failed: {0}")]
    ActionFatal(String),

    /// A step produced more output than the configured cap allows.
    #[error("step output of {size} bytes exceeds the {limit} byte cap")]
    OutputTooLarge {
        /// Actual output size in bytes.
        size: usize,
        /// Configured cap in bytes.
        limit: usize,
    },

    /// The execution's cancellation token was tripped.
    #[error("cancelled")]
    Cancelled,

    /// Admission rejected the request because a quota is exhausted.
    #[error("quota exceeded: {period} limit {limit} reached")]
    QuotaExceeded {
        /// The period whose limit was hit (`daily` or `monthly`).
        period: String,
        /// The configured limit.
        limit: i64,
        /// Remaining budget at check time (zero or negative).
        remaining: i64,
    },

    /// Admission rejected the request because the tenant is not active.
    #[error("tenant {tenant} is suspended")]
    TenantSuspended {
        /// The suspended tenant.
        tenant: TenantId,
    },

    /// Persisting execution state failed even after bounded retries.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
}

impl WorkflowError {
    /// Stable string code for persistence and the event stream.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDefinition(_) => "invalid_definition",
            Self::UnknownCredential { .. } => "unknown_credential",
            Self::CredentialDecryptFailed { .. } => "credential_decrypt_failed",
            Self::InterpolationFailed { .. } => "interpolation_failed",
            Self::ActionRetryable(_) => "action_failed_retryable",
            Self::ActionFatal(_) => "action_failed_fatal",
            Self::OutputTooLarge { .. } => "output_too_large",
            Self::Cancelled => "cancelled",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::TenantSuspended { .. } => "tenant_suspended",
            Self::PersistenceFailed(_) => "persistence_failed",
        }
    }

    /// Whether the executor may retry the failing step.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ActionRetryable(_))
    }
}

impl From<DefinitionError> for WorkflowError {
    fn from(err: DefinitionError) -> Self {
        Self::InvalidDefinition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            WorkflowError::ActionRetryable("boom".into()).kind(),
            "action_failed_retryable"
        );
        assert_eq!(WorkflowError::Cancelled.kind(), "cancelled");
        assert_eq!(
            WorkflowError::OutputTooLarge { size: 10, limit: 5 }.kind(),
            "output_too_large"
        );
    }

    #[test]
    fn only_retryable_kind_retries() {
        assert!(WorkflowError::ActionRetryable("x".into()).is_retryable());
        assert!(!WorkflowError::ActionFatal("x".into()).is_retryable());
        assert!(!WorkflowError::Cancelled.is_retryable());
    }

    #[test]
    fn definition_errors_convert() {
        let err: WorkflowError = DefinitionError::Empty.into();
        assert_eq!(err.kind(), "invalid_definition");
    }
}
