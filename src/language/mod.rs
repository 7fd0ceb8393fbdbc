// Language environment architecture for hookenv
// Per-language backends behind a common trait, plus identity, health and provisioning

pub mod base;
pub mod conda;
pub mod coursier;
pub mod dart;
pub mod dependency;
pub mod dotnet;
pub mod environment;
pub mod health;
pub mod nodejs;
pub mod perl;
pub mod provision;
pub mod python;
pub mod r;
pub mod registry;
pub mod ruby;
pub mod rust;
pub mod traits;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for easier access
pub use base::BaseLanguagePlugin;
pub use conda::CondaLanguagePlugin;
pub use coursier::CoursierLanguagePlugin;
pub use dart::DartLanguagePlugin;
pub use dependency::{select_tool, SelectedTool, StagingGuard};
pub use dotnet::DotnetLanguagePlugin;
pub use environment::{EnvironmentIdentity, HealthStatus, NamingStyle};
pub use health::{HealthCheckError, HealthChecker, HealthReport, HealthResult};
pub use nodejs::NodejsLanguagePlugin;
pub use perl::PerlLanguagePlugin;
pub use provision::{IdentityLocks, Provisioner, SetupRequest};
pub use python::PythonLanguagePlugin;
pub use r::RLanguagePlugin;
pub use registry::LanguageRegistry;
pub use ruby::RubyLanguagePlugin;
pub use rust::RustLanguagePlugin;
pub use traits::{DriftPolicy, EnvironmentContext, Language};
pub use version::{
    DefaultVersionCell, EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy,
    DEFAULT_VERSION, SYSTEM_VERSION,
};
