//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur with telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The logging configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Installing the global subscriber failed.
    #[error("initialization error: {0}")]
    Init(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
