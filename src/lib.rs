// hookenv - Library module
// Identity, health checking and idempotent provisioning of per-language hook environments

pub mod cli;
pub mod config;
pub mod error;
pub mod language;
pub mod logging;
pub mod process;
pub mod recovery;
pub mod storage;

// Re-export main types for easier access
pub use config::Settings;
pub use error::{
    exit_codes, CliError, ConfigError, EnvError, ProcessError, ProvisionError, Result,
    StateError,
};
pub use language::{
    EnvironmentIdentity, HealthChecker, HealthReport, HealthStatus, Language, LanguageRegistry,
    NamingStyle, Provisioner, ResolvedVersion, SetupRequest,
};
pub use logging::{ColorConfig, LogConfig, LogFormat};
pub use process::{ProcessEnvironment, ProcessToolRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use recovery::{BrokenEnvironmentRecovery, RecoveryAction};
pub use storage::{InstallState, StateStore, STATE_FILE_V1, STATE_FILE_V2};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

// Build information (set by build script)
pub const BUILD_DATE: &str = env!("BUILD_DATE");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const RUST_VERSION: &str = env!("RUST_VERSION");

/// Get formatted version string with build information
pub fn version_info() -> String {
    format!("{NAME} {VERSION} (commit: {GIT_COMMIT}, built: {BUILD_DATE}, rustc: {RUST_VERSION})")
}
