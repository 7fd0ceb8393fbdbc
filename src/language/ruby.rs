// Ruby language backend: gems installed into a private GEM_HOME using the system ruby

use semver::{Version, VersionReq};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::process::{ProcessEnvironment, ToolInvocation, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::StagingGuard;
use super::health::{require_executables, require_path, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const RUBY_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::SystemIfAvailable, ExplicitRequest::Keep);

const RUBY_EXECUTABLES: &[&str] = &["ruby", "gem"];

const GEM_INSTALL_FLAGS: &[&str] = &[
    "install",
    "--no-document",
    "--no-format-executable",
    "--no-user-install",
];

const HOST_VARIABLES: &[&str] = &["GEM_PATH", "BUNDLE_PATH", "BUNDLE_GEMFILE", "RUBYOPT"];

/// Ruby language plugin
pub struct RubyLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl RubyLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("ruby", runner, RUBY_POLICY, RUBY_EXECUTABLES),
        }
    }

    pub fn gems_dir(env_path: &Path) -> PathBuf {
        env_path.join("gems")
    }

    /// Explicit requests are served by the system ruby only when its version matches
    fn verify_ruby_version(&self, ctx: &EnvironmentContext<'_>, ruby: &Path) -> Result<()> {
        let Some(requested) = ctx.version.explicit() else {
            return Ok(());
        };

        let invocation =
            ToolInvocation::new(ruby.to_string_lossy()).with_args(["-e", "print RUBY_VERSION"]);
        let output = ctx.run_step("ruby version", &invocation)?;
        let installed = output.stdout().trim().to_string();

        if version_satisfies(&installed, requested) {
            debug!(installed = %installed, requested = requested, "Ruby version matches");
            return Ok(());
        }

        Err(ProvisionError::RuntimeUnavailable {
            language: ctx.language.to_string(),
            executable: format!("ruby {requested}"),
            suggestion: Some(format!(
                "The ruby on PATH is {installed}; install ruby {requested} or request 'system'"
            )),
        }
        .into())
    }

    fn gem_install<I, S>(&self, ctx: &EnvironmentContext<'_>, step: &str, gems: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let gems_dir = Self::gems_dir(&ctx.env_path);
        let mut invocation = self
            .env_invocation(&ctx.env_path, "gem")
            .with_args(GEM_INSTALL_FLAGS.iter().copied())
            .arg("--install-dir")
            .arg(&gems_dir)
            .arg("--bindir")
            .arg(gems_dir.join("bin"))
            .with_args(gems);
        if let Some(repo) = &ctx.repo_path {
            invocation = invocation.with_working_dir(repo);
        }
        ctx.run_step(step, &invocation)?;
        Ok(())
    }

    /// Build every gemspec in the repository and install the resulting gems. Built
    /// `.gem` files are staging artifacts.
    fn install_repository(&self, ctx: &EnvironmentContext<'_>, repo: &Path) -> Result<()> {
        let gemspecs = files_with_extension(repo, "gemspec");
        if gemspecs.is_empty() {
            return Ok(());
        }

        let existing = files_with_extension(repo, "gem");
        let mut staging = StagingGuard::new();

        for gemspec in &gemspecs {
            let build = self
                .env_invocation(&ctx.env_path, "gem")
                .arg("build")
                .arg(gemspec)
                .with_working_dir(repo);
            let result = ctx.run_step("gem build", &build);
            for built in files_with_extension(repo, "gem").difference(&existing) {
                if !staging.tracked().contains(built) {
                    staging.track(built);
                }
            }
            result?;
        }

        let built: Vec<PathBuf> = staging.tracked().to_vec();
        info!(count = built.len(), "Installing repository gems");
        self.gem_install(ctx, "gem install", &built)
    }
}

/// `installed` satisfies `=requested` (so `3.2` accepts any 3.2.x)
fn version_satisfies(installed: &str, requested: &str) -> bool {
    let Ok(installed) = Version::parse(installed) else {
        return false;
    };
    VersionReq::parse(&format!("={requested}"))
        .map(|req| req.matches(&installed))
        .unwrap_or(false)
}

fn files_with_extension(dir: &Path, extension: &str) -> BTreeSet<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
                .collect()
        })
        .unwrap_or_default()
}

impl Language for RubyLanguagePlugin {
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
        require_executables(ctx.runner, RUBY_EXECUTABLES)?;
        require_path(&Self::gems_dir(&ctx.env_path))
    }

    fn manifest_check(&self, ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
        let gemfile = ctx.repo_file("Gemfile")?;
        let invocation = self
            .env_invocation(&ctx.env_path, "bundle")
            .arg("check")
            .arg("--gemfile")
            .arg(&gemfile);
        Some(ctx.probe(&invocation))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        let ruby = ctx.require_executable("ruby")?;
        ctx.require_executable("gem")?;
        self.verify_ruby_version(ctx, &ruby)?;

        ctx.create_dir(&Self::gems_dir(&ctx.env_path).join("bin"))?;

        if let Some(repo) = &ctx.repo_path {
            self.install_repository(ctx, repo)?;
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
        self.gem_install(ctx, "gem install", dependencies)
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let gems_dir = Self::gems_dir(env_path);
        let mut env = self
            .base
            .isolated_environment(&[gems_dir.join("bin")], HOST_VARIABLES);
        env.set_path_var("GEM_HOME", &gems_dir)
            .set_var("BUNDLE_IGNORE_CONFIG", "1");
        env
    }
}
