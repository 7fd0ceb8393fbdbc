// .NET language backend: dotnet tools installed into a private tool path

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::process::{ProcessEnvironment, ToolInvocation, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::{split_versioned, StagingGuard};
use super::health::HealthResult;
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const DOTNET_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::AlwaysDefault, ExplicitRequest::Keep);

/// Pack output directory inside the repository
const PACK_DIR: &str = "hookenv-pack";

const PROJECT_EXTENSIONS: &[&str] = &["csproj", "fsproj", "vbproj", "sln"];

/// .NET language plugin
pub struct DotnetLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl DotnetLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("dotnet", runner, DOTNET_POLICY, &[]),
        }
    }

    pub fn tool_path(env_path: &Path) -> PathBuf {
        env_path.join("bin")
    }

    fn dotnet(&self, env_path: &Path) -> ToolInvocation {
        self.env_invocation(env_path, "dotnet")
    }

    /// An explicit version must be one of the installed SDKs
    fn verify_sdk(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        let Some(requested) = ctx.version.explicit() else {
            return Ok(());
        };

        let list_sdks = self.dotnet(&ctx.env_path).arg("--list-sdks");
        let output = ctx.run_step("dotnet --list-sdks", &list_sdks)?;
        let stdout = output.stdout();
        let installed = stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .any(|sdk| sdk == requested || sdk.starts_with(&format!("{requested}.")));

        if installed {
            return Ok(());
        }
        Err(ProvisionError::RuntimeUnavailable {
            language: ctx.language.to_string(),
            executable: format!("dotnet SDK {requested}"),
            suggestion: Some(format!("Installed SDKs:\n{}", stdout.trim())),
        }
        .into())
    }

    fn tool_install(
        &self,
        ctx: &EnvironmentContext<'_>,
        package: &str,
        version: Option<&str>,
        source: Option<&Path>,
    ) -> Result<()> {
        let mut invocation = self
            .dotnet(&ctx.env_path)
            .with_args(["tool", "install", "--tool-path"])
            .arg(Self::tool_path(&ctx.env_path));
        if let Some(source) = source {
            invocation = invocation.arg("--add-source").arg(source);
        }
        if let Some(version) = version {
            invocation = invocation.with_args(["--version", version]);
        }
        invocation = invocation.arg(package);
        ctx.run_step("dotnet tool install", &invocation)?;
        Ok(())
    }

    /// `dotnet pack` the repository into a staging directory and install every
    /// produced tool package from it.
    fn install_repository(&self, ctx: &EnvironmentContext<'_>, repo: &Path) -> Result<()> {
        let pack_dir = repo.join(PACK_DIR);
        let mut staging = StagingGuard::new();
        staging.track(&pack_dir);

        let pack = self
            .dotnet(&ctx.env_path)
            .with_args(["pack", "--configuration", "Release", "--output"])
            .arg(&pack_dir)
            .with_working_dir(repo);
        ctx.run_step("dotnet pack", &pack)?;

        let mut packages: Vec<String> = std::fs::read_dir(&pack_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| package_id(&entry.file_name().to_string_lossy()))
                    .collect()
            })
            .unwrap_or_default();
        packages.sort();
        packages.dedup();
        debug!(packages = ?packages, "Packed tool packages");

        for package in &packages {
            self.tool_install(ctx, package, None, Some(&pack_dir))?;
        }
        Ok(())
    }
}

/// Package id of `<Id>.<Version>.nupkg`: everything before the first segment that
/// starts a numeric version.
fn package_id(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".nupkg")?;
    if stem.ends_with(".symbols") {
        return None;
    }
    let segments: Vec<&str> = stem.split('.').collect();
    let version_start = segments
        .iter()
        .position(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))?;
    if version_start == 0 {
        return None;
    }
    Some(segments[..version_start].join("."))
}

impl Language for DotnetLanguagePlugin {
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

    /// No base probe: installed tools are self-contained
    fn health_check(&self, _ctx: &EnvironmentContext<'_>) -> HealthResult {
        Ok(())
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        ctx.require_executable("dotnet")?;
        self.verify_sdk(ctx)?;
        ctx.create_dir(&Self::tool_path(&ctx.env_path))?;

        let has_project = PROJECT_EXTENSIONS
            .iter()
            .any(|ext| ctx.repo_file_with_extension(ext).is_some());
        if has_project {
            if let Some(repo) = &ctx.repo_path {
                self.install_repository(ctx, repo)?;
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
            self.tool_install(ctx, name, version, None)?;
        }
        Ok(())
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self
            .base
            .isolated_environment(&[Self::tool_path(env_path)], &[]);
        env.set_var("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
            .set_var("DOTNET_NOLOGO", "1")
            .set_var("DOTNET_SKIP_FIRST_TIME_EXPERIENCE", "1");
        env
    }
}
