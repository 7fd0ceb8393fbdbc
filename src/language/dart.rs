// Dart language backend: executables activated into a private pub cache

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::process::{ProcessEnvironment, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::split_versioned;
use super::health::HealthResult;
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const DART_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::AlwaysDefault, ExplicitRequest::NormalizeToDefault);

/// Dart language plugin
pub struct DartLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl DartLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("dart", runner, DART_POLICY, &[]),
        }
    }

    pub fn pub_cache(env_path: &Path) -> PathBuf {
        env_path.join("pub-cache")
    }
}

impl Language for DartLanguagePlugin {
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

    /// No base probe: dart environments only hold activated packages
    fn health_check(&self, _ctx: &EnvironmentContext<'_>) -> HealthResult {
        Ok(())
    }

    fn manifest_check(&self, ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
        ctx.repo_file("pubspec.lock")?;
        let repo = ctx.repo_path.as_ref()?;
        let invocation = self
            .env_invocation(&ctx.env_path, "dart")
            .with_args(["pub", "get", "--offline", "--dry-run"])
            .with_working_dir(repo);
        Some(ctx.probe(&invocation))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        ctx.require_executable("dart")?;
        ctx.create_dir(&Self::pub_cache(&ctx.env_path))?;

        if ctx.repo_file("pubspec.yaml").is_some() {
            if let Some(repo) = &ctx.repo_path {
                let invocation = self
                    .env_invocation(&ctx.env_path, "dart")
                    .with_args(["pub", "global", "activate", "--source", "path"])
                    .arg(repo)
                    .with_working_dir(repo);
                ctx.run_step("dart pub global activate", &invocation)?;
            }
        }
        Ok(())
    }

    /// `name` or `name:version`
    fn install_dependencies(
        &self,
        ctx: &EnvironmentContext<'_>,
        dependencies: &[String],
    ) -> Result<()> {
        for dependency in dependencies {
            let (name, version) = split_versioned(dependency);
            let mut invocation = self
                .env_invocation(&ctx.env_path, "dart")
                .with_args(["pub", "global", "activate", name]);
            if let Some(version) = version {
                invocation = invocation.arg(version);
            }
            ctx.run_step("dart pub global activate", &invocation)?;
        }
        Ok(())
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let pub_cache = Self::pub_cache(env_path);
        let mut env = self
            .base
            .isolated_environment(&[pub_cache.join("bin")], &[]);
        env.set_path_var("PUB_CACHE", &pub_cache);
        env
    }
}
