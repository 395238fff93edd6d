//! Configuration error types.

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The file that could not be parsed.
        path: String,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment override holds a value of the wrong type.
    #[error("invalid value for {var}: {value}")]
    InvalidEnvValue {
        /// The environment variable.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// The merged configuration failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
