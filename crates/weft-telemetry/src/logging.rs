//! Tracing subscriber configuration.

use tracing_subscriber::EnvFilter;

use crate::error::{TelemetryError, TelemetryResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-oriented multi-line output.
    Pretty,
    /// Single-line output for terminals and log shippers.
    #[default]
    Compact,
    /// Structured JSON, one object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::Config(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level applied to every target.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Extra `target=level` directives appended to the filter.
    pub directives: Vec<String>,
}

impl LogConfig {
    /// Create a configuration at the given base level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            directives: Vec::new(),
        }
    }

    /// Select the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Append a `target=level` directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut spec = self.level.clone();
        for directive in &self.directives {
            spec.push(',');
            spec.push_str(directive);
        }
        spec.parse()
            .map_err(|e| TelemetryError::Config(format!("bad filter {spec:?}: {e}")))
    }
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops so test binaries
/// can initialize logging from every test.
///
/// # Errors
///
/// Returns [`TelemetryError::Config`] if the filter spec does not parse.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // A second init means a subscriber is already installed; keep it.
    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
    Ok(())
}

/// Install a compact `info`-level subscriber honouring `RUST_LOG`.
///
/// # Errors
///
/// Returns [`TelemetryError::Config`] if `RUST_LOG` holds an invalid spec.
pub fn setup_default_logging() -> TelemetryResult<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    setup_logging(&LogConfig::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn directives_extend_the_filter() {
        let config = LogConfig::new("info").with_directive("weft_engine=debug");
        assert!(config.filter().is_ok());
    }

    #[test]
    fn bad_level_is_rejected() {
        let config = LogConfig::new("not-a-level=");
        assert!(config.filter().is_err());
    }

    #[test]
    fn setup_is_idempotent() {
        let config = LogConfig::new("info");
        assert!(setup_logging(&config).is_ok());
        assert!(setup_logging(&config).is_ok());
    }
}
