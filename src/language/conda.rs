// Conda language backend: prefix environments built by mamba, micromamba or conda

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ProvisionError, Result};
use crate::process::{ProcessEnvironment, ToolInvocation, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::{select_tool, SelectedTool};
use super::environment::NamingStyle;
use super::health::{require_path, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const CONDA_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::AlwaysDefault, ExplicitRequest::NormalizeToDefault);

/// Tried in order; the first one on PATH does all the work
const CONDA_TOOLS: &[&str] = &["mamba", "micromamba", "conda"];

const ENVIRONMENT_FILE: &str = "environment.yml";

const HOST_VARIABLES: &[&str] = &["CONDARC", "CONDA_DEFAULT_ENV", "CONDA_SHLVL"];

/// Conda language plugin
pub struct CondaLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl CondaLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("conda", runner, CONDA_POLICY, &[]),
        }
    }

    fn select_conda(&self, ctx: &EnvironmentContext<'_>) -> Result<SelectedTool> {
        select_tool(ctx.runner, CONDA_TOOLS).ok_or_else(|| {
            ProvisionError::RuntimeUnavailable {
                language: ctx.language.to_string(),
                executable: "conda".to_string(),
                suggestion: Some("Install mamba, micromamba or conda".to_string()),
            }
            .into()
        })
    }

    fn tool_invocation(&self, env_path: &Path, tool: &SelectedTool) -> ToolInvocation {
        self.env_invocation(env_path, &tool.path.to_string_lossy())
    }

    /// Directories holding executables of a conda prefix
    pub fn bin_dirs(env_path: &Path) -> Vec<PathBuf> {
        if cfg!(windows) {
            vec![
                env_path.to_path_buf(),
                env_path.join("Library").join("bin"),
                env_path.join("Scripts"),
            ]
        } else {
            vec![env_path.join("bin")]
        }
    }
}

impl Language for CondaLanguagePlugin {
    fn language_name(&self) -> &str {
        self.base.name
    }

    fn naming_style(&self) -> NamingStyle {
        NamingStyle::Dashed
    }

    fn runner(&self) -> &dyn ToolRunner {
        self.base.runner()
    }

    fn resolve_version(&self, requested: &str) -> ResolvedVersion {
        self.base.resolve_version(requested)
    }

    fn invalidate_default_version(&self) {
        self.base.invalidate_default_version();
    }

    fn health_check(&self, ctx: &EnvironmentContext<'_>) -> HealthResult {
        require_path(&ctx.env_dir("conda-meta"))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        let tool = self.select_conda(ctx)?;
        let invocation = self.tool_invocation(&ctx.env_path, &tool);

        let invocation = match ctx.repo_file(ENVIRONMENT_FILE) {
            Some(file) if tool.name == "micromamba" => invocation
                .with_args(["create", "--yes", "--prefix"])
                .arg(&ctx.env_path)
                .arg("--file")
                .arg(file),
            Some(file) => invocation
                .with_args(["env", "create", "--prefix"])
                .arg(&ctx.env_path)
                .arg("--file")
                .arg(file),
            None => invocation
                .with_args(["create", "--yes", "--prefix"])
                .arg(&ctx.env_path),
        };

        ctx.run_step(&format!("{} create", tool.name), &invocation)?;
        Ok(())
    }

    fn install_dependencies(
        &self,
        ctx: &EnvironmentContext<'_>,
        dependencies: &[String],
    ) -> Result<()> {
        if dependencies.is_empty() {
            return Ok(());
        }

        let tool = self.select_conda(ctx)?;
        let invocation = self
            .tool_invocation(&ctx.env_path, &tool)
            .with_args(["install", "--yes", "--prefix"])
            .arg(&ctx.env_path)
            .with_args(dependencies);
        ctx.run_step(&format!("{} install", tool.name), &invocation)?;
        Ok(())
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self
            .base
            .isolated_environment(&Self::bin_dirs(env_path), HOST_VARIABLES);
        env.set_path_var("CONDA_PREFIX", env_path);
        env
    }
}
