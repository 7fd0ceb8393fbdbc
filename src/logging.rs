// Logging setup for hookenv
use std::io::{self, IsTerminal};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ConfigError, Result};

/// Environment variable that overrides the computed filter
pub const LOG_ENV_VAR: &str = "HOOKENV_LOG";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format (pretty for terminals, json for programmatic use)
    pub format: LogFormat,
    /// Color output configuration
    pub color: ColorConfig,
    /// Whether to show targets (module names)
    pub show_targets: bool,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// JSON lines on stderr
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(ConfigError::InvalidValue {
                message: format!("unknown log format '{value}' (expected pretty, json or compact)"),
                field: "log_format".to_string(),
                value: value.to_string(),
                file_path: None,
            }),
        }
    }
}

/// Color output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConfig {
    /// Automatically detect if colors should be used
    Auto,
    Always,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            color: ColorConfig::Auto,
            show_targets: false,
        }
    }
}

impl LogConfig {
    /// Create logging configuration from CLI arguments
    pub fn from_cli(verbose: bool, quiet: bool, color: Option<String>) -> Self {
        let level = if quiet {
            Level::ERROR
        } else if verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };

        let color = match color.as_deref() {
            Some("always") => ColorConfig::Always,
            Some("never") => ColorConfig::Never,
            _ => ColorConfig::Auto,
        };

        Self {
            level,
            color,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Check if colors should be used based on configuration and terminal
    pub fn should_use_colors(&self) -> bool {
        match self.color {
            ColorConfig::Always => true,
            ColorConfig::Never => false,
            ColorConfig::Auto => {
                io::stderr().is_terminal()
                    && std::env::var("TERM").map_or(true, |term| term != "dumb")
                    && std::env::var("NO_COLOR").is_err()
            }
        }
    }

    /// Filter for the subscriber: `HOOKENV_LOG` wins over the configured level
    pub fn env_filter(&self) -> EnvFilter {
        match std::env::var(LOG_ENV_VAR) {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(format!("hookenv={}", self.level)),
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// Logs go to stderr so stdout stays reserved for command output (paths, env listings).
/// A second call is a no-op.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = config.env_filter();
    let ansi = config.should_use_colors();

    let initialized = match config.format {
        LogFormat::Pretty => fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .with_ansi(ansi)
            .with_target(config.show_targets)
            .try_init(),
        LogFormat::Json => fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .json()
            .try_init(),
        LogFormat::Compact => fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .with_ansi(ansi)
            .compact()
            .with_target(config.show_targets)
            .try_init(),
    };

    if initialized.is_err() {
        tracing::debug!("Logging already initialized");
    }
    Ok(())
}

/// Logging utilities for common operations
pub mod utils {
    use std::path::Path;
    use tracing::{debug, span, warn, Level, Span};

    /// Span covering one setup call for an environment identity
    pub fn provision_span(language: &str, version: &str, path: &Path) -> Span {
        span!(
            Level::INFO,
            "provision",
            language = %language,
            version = %version,
            path = %path.display()
        )
    }

    /// Span for loading the settings file
    pub fn config_loading_span(config_path: &Path) -> Span {
        span!(Level::DEBUG, "config_loading", path = %config_path.display())
    }

    /// Log an external tool invocation before it runs
    pub fn log_tool_invocation(command: &str, working_dir: Option<&Path>) {
        debug!(
            command = %command,
            working_dir = working_dir.map(|dir| dir.display().to_string()),
            "Running tool"
        );
    }

    /// Log a broken environment that is about to be removed
    pub fn log_broken_environment(language: &str, path: &Path, reason: &str) {
        warn!(
            language = %language,
            path = %path.display(),
            reason = %reason,
            "Removing broken environment"
        );
    }
}
