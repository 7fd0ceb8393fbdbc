// Core Language trait: the per-language capability the provisioning protocol drives

use std::path::{Path, PathBuf};

use crate::error::{EnvError, ProvisionError, Result};
use crate::process::{ProcessEnvironment, ToolInvocation, ToolOutput, ToolRunner};

use super::environment::NamingStyle;
use super::health::{HealthCheckError, HealthResult};
use super::version::ResolvedVersion;

/// Whether re-provisioning is triggered by a changed dependency set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftPolicy {
    /// Compare the recorded dependency set with the requested one
    Checked,
    /// Only the presence of the install state marker matters
    PresenceOnly,
}

/// Main trait for language environment backends
///
/// One implementation per language, registered in the `LanguageRegistry`. The generic
/// setup protocol in `provision` calls these hooks; nothing outside the registry
/// branches on the language name.
pub trait Language: Send + Sync {
    /// Language identification
    fn language_name(&self) -> &str;
    fn naming_style(&self) -> NamingStyle {
        NamingStyle::EnvSuffix
    }
    fn drift_policy(&self) -> DriftPolicy {
        DriftPolicy::PresenceOnly
    }
    fn runner(&self) -> &dyn ToolRunner;

    /// Version identity
    fn resolve_version(&self, requested: &str) -> ResolvedVersion;
    fn invalidate_default_version(&self);

    /// Health checking: cheap base probe, then the optional manifest probe
    fn health_check(&self, ctx: &EnvironmentContext<'_>) -> HealthResult;
    fn manifest_check(&self, _ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
        None
    }

    /// Environment creation inside an already created, empty directory
    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()>;

    /// Install additional dependencies. Empty `dependencies` is a no-op.
    fn install_dependencies(
        &self,
        ctx: &EnvironmentContext<'_>,
        dependencies: &[String],
    ) -> Result<()>;

    /// Process environment for tools running inside the environment
    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment;

    /// Invocation of `program` with the environment's derived process environment
    fn env_invocation(&self, env_path: &Path, program: &str) -> ToolInvocation {
        ToolInvocation::new(program).with_environment(self.process_environment(env_path).build())
    }
}

/// Everything a language hook needs to act on one environment
pub struct EnvironmentContext<'a> {
    pub language: &'a str,
    pub env_path: PathBuf,
    pub repo_path: Option<PathBuf>,
    pub version: ResolvedVersion,
    pub runner: &'a dyn ToolRunner,
}

impl<'a> EnvironmentContext<'a> {
    pub fn new(
        language: &'a dyn Language,
        env_path: PathBuf,
        repo_path: Option<PathBuf>,
        version: ResolvedVersion,
    ) -> Self {
        Self {
            language: language.language_name(),
            env_path,
            repo_path: repo_path.filter(|p| !p.as_os_str().is_empty()),
            version,
            runner: language.runner(),
        }
    }

    /// `<repo>/<name>` if the repository has that file or directory
    pub fn repo_file(&self, name: &str) -> Option<PathBuf> {
        self.repo_path
            .as_ref()
            .map(|repo| repo.join(name))
            .filter(|path| path.exists())
    }

    /// First repository entry whose file name has `extension`, in sorted order
    pub fn repo_file_with_extension(&self, extension: &str) -> Option<PathBuf> {
        let repo = self.repo_path.as_ref()?;
        let mut matches: Vec<PathBuf> = std::fs::read_dir(repo)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect();
        matches.sort();
        matches.into_iter().next()
    }

    pub fn env_dir(&self, name: &str) -> PathBuf {
        self.env_path.join(name)
    }

    /// Create a directory for the environment; failures name the language and path
    pub fn create_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|source| self.directory_error(path, source))
    }

    pub fn directory_error(&self, path: &Path, source: std::io::Error) -> EnvError {
        ProvisionError::DirectoryCreate {
            language: self.language.to_string(),
            path: path.to_path_buf(),
            source,
        }
        .into()
    }

    /// Resolve a required system executable or fail with RuntimeUnavailable
    pub fn require_executable(&self, name: &str) -> Result<PathBuf> {
        self.runner.find_executable(name).ok_or_else(|| {
            ProvisionError::RuntimeUnavailable {
                language: self.language.to_string(),
                executable: name.to_string(),
                suggestion: Some(format!("Install {name} and make sure it is on PATH")),
            }
            .into()
        })
    }

    /// Run a provisioning step; a non-zero exit becomes InstallFailed with the
    /// tool's combined output.
    pub fn run_step(&self, step: &str, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let output = self.runner.run(invocation)?;
        if !output.success() {
            return Err(ProvisionError::InstallFailed {
                language: self.language.to_string(),
                step: step.to_string(),
                path: self.env_path.clone(),
                command: invocation.to_string(),
                output: output.combined_output(),
            }
            .into());
        }
        Ok(output)
    }

    /// Run a non-mutating probe; any failure is a HealthCheckError
    pub fn probe(&self, invocation: &ToolInvocation) -> HealthResult {
        match self.runner.run(invocation) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(HealthCheckError::ProbeFailed {
                command: invocation.to_string(),
                output: output.combined_output(),
            }),
            Err(e) => Err(HealthCheckError::ProbeError {
                command: invocation.to_string(),
                error: e.to_string(),
            }),
        }
    }
}
