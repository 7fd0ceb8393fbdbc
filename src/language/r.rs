// R language backend: packages installed into a private library with Rscript

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::process::{ProcessEnvironment, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::health::{require_executables, require_path, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const R_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::SystemIfAvailable, ExplicitRequest::NormalizeToDefault);

const CRAN_MIRROR: &str = "https://cloud.r-project.org";

const HOST_VARIABLES: &[&str] = &["R_PROFILE_USER", "R_ENVIRON_USER", "R_LIBS"];

/// R language plugin
pub struct RLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl RLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("r", runner, R_POLICY, &["Rscript"]),
        }
    }

    pub fn library_dir(env_path: &Path) -> PathBuf {
        env_path.join("library")
    }

    fn rscript(&self, ctx: &EnvironmentContext<'_>, step: &str, expression: &str) -> Result<()> {
        let mut invocation = self
            .env_invocation(&ctx.env_path, "Rscript")
            .with_args(["--vanilla", "-e", expression]);
        if let Some(repo) = &ctx.repo_path {
            invocation = invocation.with_working_dir(repo);
        }
        ctx.run_step(step, &invocation)?;
        Ok(())
    }
}

/// Single-quoted R string literal
fn r_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn install_packages_expression(packages: &[String], library: &Path) -> String {
    let names: Vec<String> = packages.iter().map(|p| r_string(p)).collect();
    format!(
        "install.packages(c({}), lib = {}, repos = {})",
        names.join(", "),
        r_string(&library.to_string_lossy()),
        r_string(CRAN_MIRROR)
    )
}

fn install_source_expression(repo: &Path, library: &Path) -> String {
    format!(
        "install.packages({}, lib = {}, repos = NULL, type = 'source')",
        r_string(&repo.to_string_lossy()),
        r_string(&library.to_string_lossy())
    )
}

impl Language for RLanguagePlugin {
    fn language_name(&self) -> &str {
        self.base.name
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
        require_executables(ctx.runner, &["Rscript"])?;
        require_path(&Self::library_dir(&ctx.env_path))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        ctx.require_executable("Rscript")?;
        let library = Self::library_dir(&ctx.env_path);
        ctx.create_dir(&library)?;

        if ctx.repo_file("DESCRIPTION").is_some() {
            if let Some(repo) = &ctx.repo_path {
                self.rscript(
                    ctx,
                    "install repository package",
                    &install_source_expression(repo, &library),
                )?;
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
        let library = Self::library_dir(&ctx.env_path);
        self.rscript(
            ctx,
            "install.packages",
            &install_packages_expression(dependencies, &library),
        )
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self.base.isolated_environment(&[], HOST_VARIABLES);
        env.set_path_var("R_LIBS_USER", &Self::library_dir(env_path))
            .set_var("RENV_ACTIVATE_PROJECT", "FALSE");
        env
    }
}
