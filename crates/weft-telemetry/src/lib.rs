//! Weft Telemetry - Logging and tracing setup for the workflow execution core.
//!
//! This crate provides:
//! - Configurable logging setup with multiple output formats
//! - `EnvFilter`-based levels with per-crate directives
//! - Idempotent initialization so tests can call it repeatedly

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, setup_default_logging, setup_logging};
