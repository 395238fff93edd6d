//! Config file loading with environment overrides.
//!
//! Loading order:
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. `WEFT_`-prefixed environment variables for the common knobs
//! 4. Validation

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Load the configuration.
///
/// `path` points at an optional TOML file; `None` (or a missing file at the
/// default location) starts from built-in defaults. Environment variables are
/// applied on top, then the result is validated.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is unreadable or malformed, an
/// environment override has the wrong type, or validation fails.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;

    debug!(
        workers = config.executor.worker_pool_size,
        hub_buffer = config.hub.send_buffer_size,
        "configuration loaded"
    );
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(url) = std::env::var("WEFT_DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(url) = std::env::var("WEFT_REDIS_URL") {
        config.redis.url = url;
    }
    if let Ok(password) = std::env::var("WEFT_REDIS_PASSWORD") {
        config.redis.password = Some(password);
    }
    if let Ok(level) = std::env::var("WEFT_LOG_LEVEL") {
        config.logging.level = level;
    }
    set_parsed(
        "WEFT_WORKER_POOL_SIZE",
        &mut config.executor.worker_pool_size,
    )?;
    set_parsed(
        "WEFT_STEP_TIMEOUT_SECS",
        &mut config.executor.step_timeout_secs,
    )?;
    set_parsed(
        "WEFT_EXECUTION_TIMEOUT_SECS",
        &mut config.executor.execution_timeout_secs,
    )?;
    set_parsed("WEFT_MAX_OUTPUT_BYTES", &mut config.executor.max_output_bytes)?;
    set_parsed("WEFT_HUB_SEND_BUFFER", &mut config.hub.send_buffer_size)?;
    Ok(())
}

fn set_parsed<T: std::str::FromStr>(var: &str, slot: &mut T) -> ConfigResult<()> {
    match std::env::var(var) {
        Ok(value) => {
            *slot = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    var: var.to_owned(),
                    value,
                })?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_path_uses_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.executor.worker_pool_size, 8);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[executor]\nworker_pool_size = 2\n\n[hub]\nsend_buffer_size = 64\n"
        )
        .unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.executor.worker_pool_size, 2);
        assert_eq!(config.hub.send_buffer_size, 64);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "executor = \"not a table\"").unwrap();
        assert!(matches!(
            load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nworker_pool_size = 0\n").unwrap();
        assert!(matches!(
            load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }
}
