// Python language backend: isolated virtualenvs built with uv or the venv module,
// packages installed with uv pip or pip

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::process::{ProcessEnvironment, ToolInvocation, ToolRunner};

use super::base::{bin_dir, exe_name, BaseLanguagePlugin};
use super::dependency::select_tool;
use super::health::{require_path, HealthResult};
use super::traits::{DriftPolicy, EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const PYTHON_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::AlwaysDefault, ExplicitRequest::Keep);

/// Files whose presence in the repository enables the `pip check` probe
const MANIFESTS: &[&str] = &["setup.py", "pyproject.toml", "requirements.txt"];

/// Files that make the repository itself installable
const PROJECT_FILES: &[&str] = &["setup.py", "pyproject.toml"];

const HOST_VARIABLES: &[&str] = &["PYTHONHOME", "PIP_USER", "PIP_REQUIRE_VIRTUALENV"];

/// Python language plugin
pub struct PythonLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl PythonLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("python", runner, PYTHON_POLICY, &[]),
        }
    }

    /// Interpreter inside the virtualenv
    pub fn venv_python(env_path: &Path) -> PathBuf {
        bin_dir(env_path).join(exe_name("python"))
    }

    /// Base interpreter for `-m venv`. An explicit request only accepts
    /// `python<version>`; otherwise `python3`, then `python`.
    fn find_interpreter(&self, ctx: &EnvironmentContext<'_>) -> Result<PathBuf> {
        if let Some(version) = ctx.version.explicit() {
            return ctx.require_executable(&format!("python{version}"));
        }

        ["python3", "python"]
            .iter()
            .find_map(|name| self.base.runner.find_executable(name))
            .map_or_else(|| ctx.require_executable("python3"), Ok)
    }

    fn create_virtualenv(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        let invocation = match select_tool(ctx.runner, &["uv"]) {
            Some(uv) => {
                let mut invocation = ToolInvocation::new(uv.path.to_string_lossy())
                    .arg("venv")
                    .arg(&ctx.env_path);
                if let Some(version) = ctx.version.explicit() {
                    invocation = invocation.with_args(["--python", version]);
                }
                invocation
            }
            None => {
                let python = self.find_interpreter(ctx)?;
                ToolInvocation::new(python.to_string_lossy())
                    .with_args(["-m", "venv"])
                    .arg(&ctx.env_path)
            }
        };
        ctx.run_step("create virtualenv", &invocation)?;
        Ok(())
    }

    /// `uv pip install --python <venv python>` when uv exists, `python -m pip install`
    /// inside the venv otherwise.
    fn pip_install<I, S>(&self, ctx: &EnvironmentContext<'_>, packages: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let python = Self::venv_python(&ctx.env_path);
        let invocation = match select_tool(ctx.runner, &["uv"]) {
            Some(uv) => self
                .env_invocation(&ctx.env_path, &uv.path.to_string_lossy())
                .with_args(["pip", "install", "--python"])
                .arg(&python),
            None => self
                .env_invocation(&ctx.env_path, &python.to_string_lossy())
                .with_args(["-m", "pip", "install"]),
        };

        let mut invocation = invocation.with_args(packages);
        if let Some(repo) = &ctx.repo_path {
            invocation = invocation.with_working_dir(repo);
        }
        ctx.run_step("pip install", &invocation)?;
        Ok(())
    }
}

impl Language for PythonLanguagePlugin {
    fn language_name(&self) -> &str {
        self.base.name
    }

    fn drift_policy(&self) -> DriftPolicy {
        DriftPolicy::Checked
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
        let python = Self::venv_python(&ctx.env_path);
        require_path(&python)?;

        let invocation = self
            .env_invocation(&ctx.env_path, &python.to_string_lossy())
            .with_args(["-c", "import sys; sys.exit(0)"]);
        ctx.probe(&invocation)
    }

    fn manifest_check(&self, ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
        MANIFESTS.iter().find_map(|name| ctx.repo_file(name))?;

        let python = Self::venv_python(&ctx.env_path);
        let invocation = self
            .env_invocation(&ctx.env_path, &python.to_string_lossy())
            .with_args(["-m", "pip", "check"]);
        Some(ctx.probe(&invocation))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        self.create_virtualenv(ctx)?;

        if PROJECT_FILES.iter().any(|name| ctx.repo_file(name).is_some()) {
            if let Some(repo) = &ctx.repo_path {
                debug!(repo = %repo.display(), "Installing repository into virtualenv");
                self.pip_install(ctx, [repo.as_os_str()])?;
            }
        }
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
        self.pip_install(ctx, dependencies)
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self
            .base
            .isolated_environment(&[bin_dir(env_path)], HOST_VARIABLES);
        env.set_path_var("VIRTUAL_ENV", env_path)
            .set_var("PIP_DISABLE_PIP_VERSION_CHECK", "1");
        env
    }
}
