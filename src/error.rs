// Error handling framework for hookenv
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnvError>;

/// Main error type for hookenv
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<ConfigError>),

    #[error("Environment provisioning failed: {0}")]
    Provision(#[from] Box<ProvisionError>),

    #[error("Install state error: {0}")]
    State(#[from] Box<StateError>),

    #[error("Process execution failed: {0}")]
    Process(#[from] Box<ProcessError>),

    #[error("CLI argument error: {0}")]
    Cli(#[from] Box<CliError>),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No base directory for {language} environment: both repository path and cache directory are empty")]
    MissingBaseDirectory { language: String },

    #[error("Invalid YAML syntax: {message}")]
    InvalidYaml {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
        file_path: Option<PathBuf>,
    },

    #[error("Configuration file not found: {path}")]
    NotFound {
        path: PathBuf,
        suggestion: Option<String>,
    },

    #[error("Invalid configuration value: {message}")]
    InvalidValue {
        message: String,
        field: String,
        value: String,
        file_path: Option<PathBuf>,
    },
}

/// Errors raised while creating, recovering or populating an environment
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Unknown language: {language}")]
    UnknownLanguage {
        language: String,
        available: Vec<String>,
    },

    #[error("{language}: required executable '{executable}' not found")]
    RuntimeUnavailable {
        language: String,
        executable: String,
        suggestion: Option<String>,
    },

    #[error("{language}: failed to create environment directory {path}: {source}")]
    DirectoryCreate {
        language: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{language}: failed to remove broken environment {path}: {source}")]
    DirectoryRemove {
        language: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{language}: {step} failed in {path}: `{command}`")]
    InstallFailed {
        language: String,
        step: String,
        path: PathBuf,
        command: String,
        output: String,
    },
}

/// Install state marker errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read install state {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to write install state {path}: {error}")]
    Write { path: PathBuf, error: String },

    #[error("Install state {path} is corrupt: {error}")]
    Corrupt { path: PathBuf, error: String },
}

/// Process execution errors
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Process spawn failed: {command}")]
    SpawnFailed { command: String, error: String },
}

/// CLI argument errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Conflicting arguments: {first} and {second}")]
    ConflictingArguments {
        first: String,
        second: String,
        suggestion: String,
    },
}

/// Format errors with colors and context
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format an error with context and colors
    pub fn format_error(&self, error: &EnvError) -> String {
        use tracing::error;

        let error_type = match error {
            EnvError::Config(_) => "config",
            EnvError::Provision(_) => "provision",
            EnvError::State(_) => "state",
            EnvError::Process(_) => "process",
            EnvError::Cli(_) => "cli",
            EnvError::Io(_) => "io",
        };
        error!(error_type = error_type, error = %error, "Operation failed");

        let mut output = String::new();
        if self.use_colors {
            output.push_str("\x1b[31m");
        }
        output.push_str("Error: ");
        if self.use_colors {
            output.push_str("\x1b[0m");
        }
        output.push_str(&error.to_string());

        match error {
            EnvError::Config(config_err) => self.add_config_context(&mut output, config_err),
            EnvError::Provision(provision_err) => {
                self.add_provision_context(&mut output, provision_err)
            }
            EnvError::Process(process_err) => self.add_process_context(&mut output, process_err),
            EnvError::Cli(cli_err) => {
                let CliError::ConflictingArguments { suggestion, .. } = cli_err.as_ref();
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            _ => {}
        }

        output
    }

    fn add_config_context(&self, output: &mut String, error: &ConfigError) {
        match error {
            ConfigError::InvalidYaml {
                file_path: Some(path),
                line: Some(line),
                ..
            } => {
                output.push_str(&format!("\n  --> {}:{}", path.display(), line));
            }
            ConfigError::NotFound {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            ConfigError::MissingBaseDirectory { .. } => {
                output.push_str("\n  Help: pass --repo or --cache-dir, or set HOOKENV_HOME");
            }
            _ => {}
        }
    }

    fn add_provision_context(&self, output: &mut String, error: &ProvisionError) {
        match error {
            ProvisionError::RuntimeUnavailable {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            ProvisionError::InstallFailed { output: log, .. } if !log.trim().is_empty() => {
                output.push_str(&format!("\n  Tool output:\n{}", log.trim_end()));
            }
            ProvisionError::UnknownLanguage { available, .. } => {
                output.push_str(&format!("\n  Available: {}", available.join(", ")));
            }
            _ => {}
        }
    }

    fn add_process_context(&self, output: &mut String, error: &ProcessError) {
        let ProcessError::SpawnFailed { error, .. } = error;
        output.push_str(&format!("\n  Cause: {error}"));
    }
}

/// Process exit codes used by the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const RUNTIME_UNAVAILABLE: i32 = 3;
    pub const INSTALL_FAILURE: i32 = 4;
    pub const PERMISSION_ERROR: i32 = 5;
    pub const CLI_ERROR: i32 = 7;
    pub const STATE_ERROR: i32 = 8;
    pub const PROCESS_ERROR: i32 = 9;
}

impl EnvError {
    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            EnvError::Config(_) => exit_codes::CONFIG_ERROR,
            EnvError::Provision(provision_err) => match provision_err.as_ref() {
                ProvisionError::UnknownLanguage { .. } => exit_codes::CONFIG_ERROR,
                ProvisionError::RuntimeUnavailable { .. } => exit_codes::RUNTIME_UNAVAILABLE,
                ProvisionError::DirectoryCreate { .. } | ProvisionError::DirectoryRemove { .. } => {
                    exit_codes::PERMISSION_ERROR
                }
                ProvisionError::InstallFailed { .. } => exit_codes::INSTALL_FAILURE,
            },
            EnvError::State(_) => exit_codes::STATE_ERROR,
            EnvError::Process(_) => exit_codes::PROCESS_ERROR,
            EnvError::Cli(_) => exit_codes::CLI_ERROR,
            EnvError::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }

    /// Create a user-friendly error message with context
    pub fn user_message(&self, use_colors: bool) -> String {
        ErrorFormatter::new(use_colors).format_error(self)
    }
}

impl From<ConfigError> for EnvError {
    fn from(error: ConfigError) -> Self {
        EnvError::Config(Box::new(error))
    }
}

impl From<ProvisionError> for EnvError {
    fn from(error: ProvisionError) -> Self {
        EnvError::Provision(Box::new(error))
    }
}

impl From<StateError> for EnvError {
    fn from(error: StateError) -> Self {
        EnvError::State(Box::new(error))
    }
}

impl From<ProcessError> for EnvError {
    fn from(error: ProcessError) -> Self {
        EnvError::Process(Box::new(error))
    }
}

// Conversion from serde_yaml::Error to ConfigError
impl From<serde_yaml::Error> for Box<ConfigError> {
    fn from(error: serde_yaml::Error) -> Self {
        let location = error.location();
        Box::new(ConfigError::InvalidYaml {
            message: error.to_string(),
            line: location.as_ref().map(|l| l.line() as u32),
            column: location.as_ref().map(|l| l.column() as u32),
            file_path: None,
        })
    }
}
