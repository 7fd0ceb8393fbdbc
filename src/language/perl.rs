// Perl language backend: modules installed into a local::lib style prefix with cpanm,
// falling back to cpan

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ProvisionError, Result};
use crate::process::{ProcessEnvironment, ToolInvocation, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::select_tool;
use super::health::{require_executables, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const PERL_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::SystemIfAvailable, ExplicitRequest::NormalizeToDefault);

const INSTALLERS: &[&str] = &["cpanm", "cpan"];

/// Build files that make the repository itself installable
const BUILD_FILES: &[&str] = &["Makefile.PL", "Build.PL"];

const HOST_VARIABLES: &[&str] = &["PERL_CPANM_OPT", "PERL5OPT", "PERL_LOCAL_LIB_ROOT"];

/// Perl language plugin
pub struct PerlLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl PerlLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("perl", runner, PERL_POLICY, &["perl"]),
        }
    }

    pub fn lib_dir(env_path: &Path) -> PathBuf {
        env_path.join("lib").join("perl5")
    }

    /// `cpanm --local-lib <env> --notest`, or `cpan -T` with the install base passed
    /// through PERL_MM_OPT/PERL_MB_OPT (already part of the derived environment).
    fn install<I, S>(&self, ctx: &EnvironmentContext<'_>, modules: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let installer = select_tool(ctx.runner, INSTALLERS).ok_or_else(|| {
            ProvisionError::RuntimeUnavailable {
                language: ctx.language.to_string(),
                executable: "cpanm".to_string(),
                suggestion: Some("Install App::cpanminus or make cpan available".to_string()),
            }
        })?;

        let invocation: ToolInvocation =
            self.env_invocation(&ctx.env_path, &installer.path.to_string_lossy());
        let mut invocation = if installer.name == "cpanm" {
            invocation
                .arg("--local-lib")
                .arg(&ctx.env_path)
                .arg("--notest")
        } else {
            invocation.arg("-T")
        };
        invocation = invocation.with_args(modules);
        if let Some(repo) = &ctx.repo_path {
            invocation = invocation.with_working_dir(repo);
        }

        ctx.run_step(&format!("{} install", installer.name), &invocation)?;
        Ok(())
    }
}

impl Language for PerlLanguagePlugin {
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
        require_executables(ctx.runner, &["perl"])
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        ctx.require_executable("perl")?;

        if BUILD_FILES.iter().any(|name| ctx.repo_file(name).is_some()) {
            if let Some(repo) = &ctx.repo_path {
                self.install(ctx, [repo.as_os_str()])?;
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
        self.install(ctx, dependencies)
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self
            .base
            .isolated_environment(&[env_path.join("bin")], HOST_VARIABLES);
        let root = env_path.to_string_lossy();
        env.set_path_var("PERL5LIB", &Self::lib_dir(env_path))
            .set_var("PERL_LOCAL_LIB_ROOT", &root)
            .set_var("PERL_MB_OPT", format!("--install_base {root}"))
            .set_var("PERL_MM_OPT", format!("INSTALL_BASE={root}"));
        env
    }
}
