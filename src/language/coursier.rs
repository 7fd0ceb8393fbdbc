// Coursier language backend: JVM applications installed with cs/coursier into an
// apps directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ProvisionError, Result};
use crate::process::{ProcessEnvironment, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::select_tool;
use super::health::{require_path, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const COURSIER_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::AlwaysDefault, ExplicitRequest::NormalizeToDefault);

const COURSIER_TOOLS: &[&str] = &["cs", "coursier"];

/// Channel directory a hook repository may ship its app descriptors in
const CHANNEL_DIR: &str = ".pre-commit-channel";

/// Coursier language plugin
pub struct CoursierLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl CoursierLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("coursier", runner, COURSIER_POLICY, &[]),
        }
    }

    pub fn apps_dir(env_path: &Path) -> PathBuf {
        env_path.join("apps")
    }
}

impl Language for CoursierLanguagePlugin {
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
        require_path(&Self::apps_dir(&ctx.env_path))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        if select_tool(ctx.runner, COURSIER_TOOLS).is_none() {
            return Err(ProvisionError::RuntimeUnavailable {
                language: ctx.language.to_string(),
                executable: "cs".to_string(),
                suggestion: Some("Install coursier (cs) and make sure it is on PATH".to_string()),
            }
            .into());
        }
        ctx.create_dir(&Self::apps_dir(&ctx.env_path))?;
        Ok(())
    }

    /// Apps are installed by name; a repository channel directory is searched first
    fn install_dependencies(
        &self,
        ctx: &EnvironmentContext<'_>,
        dependencies: &[String],
    ) -> Result<()> {
        if dependencies.is_empty() {
            return Ok(());
        }

        let tool = select_tool(ctx.runner, COURSIER_TOOLS).ok_or_else(|| {
            ProvisionError::RuntimeUnavailable {
                language: ctx.language.to_string(),
                executable: "cs".to_string(),
                suggestion: None,
            }
        })?;

        let mut invocation = self
            .env_invocation(&ctx.env_path, &tool.path.to_string_lossy())
            .arg("install")
            .arg("--dir")
            .arg(Self::apps_dir(&ctx.env_path));
        if let Some(channel) = ctx.repo_file(CHANNEL_DIR) {
            invocation = invocation
                .arg("--default-channels=false")
                .arg("--channel")
                .arg(channel);
        }
        invocation = invocation.with_args(dependencies);

        ctx.run_step(&format!("{} install", tool.name), &invocation)?;
        Ok(())
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self
            .base
            .isolated_environment(&[Self::apps_dir(env_path)], &["COURSIER_REPOSITORIES"]);
        env.set_path_var("COURSIER_CACHE", &env_path.join("cache"));
        env
    }
}
