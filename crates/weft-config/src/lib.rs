//! Weft Config - Configuration envelope for the workflow execution core.
//!
//! This crate provides:
//! - Serde-backed configuration sections with production defaults
//! - Loading from an optional TOML file with `WEFT_`-prefixed environment
//!   variable overrides for the common knobs
//! - Validation of the merged configuration
//!
//! Every section implements [`Default`] so a bare `[section]` header in TOML
//! produces a working configuration.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use types::{
    AuditSection, CollaborationSection, Config, DatabaseSection, ExecutorSection, HubSection,
    LoggingSection, RedisSection, RetrySection, ServerSection,
};
