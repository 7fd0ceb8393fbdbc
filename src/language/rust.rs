// Rust language backend: binaries installed with `cargo install --root <env>` using
// the system toolchain

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::process::{ProcessEnvironment, ToolRunner};

use super::base::BaseLanguagePlugin;
use super::dependency::split_versioned;
use super::health::{require_executables, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const RUST_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::SystemIfAvailable, ExplicitRequest::NormalizeToDefault);

const RUST_EXECUTABLES: &[&str] = &["cargo", "rustc"];

const HOST_VARIABLES: &[&str] = &["CARGO_INSTALL_ROOT", "CARGO_TARGET_DIR"];

/// Rust language plugin
pub struct RustLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl RustLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("rust", runner, RUST_POLICY, RUST_EXECUTABLES),
        }
    }

    fn cargo_install(&self, ctx: &EnvironmentContext<'_>, args: &[&OsStr]) -> Result<()> {
        let mut invocation = self
            .env_invocation(&ctx.env_path, "cargo")
            .arg("install")
            .arg("--root")
            .arg(&ctx.env_path)
            .with_args(args.iter().copied());
        if let Some(repo) = &ctx.repo_path {
            invocation = invocation.with_working_dir(repo);
        }
        ctx.run_step("cargo install", &invocation)?;
        Ok(())
    }
}

/// The user's cargo and rustup homes, so the system toolchain stays reachable
fn toolchain_home(variable: &str, directory: &str) -> Option<PathBuf> {
    std::env::var_os(variable)
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(directory)))
}

impl Language for RustLanguagePlugin {
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
        require_executables(ctx.runner, RUST_EXECUTABLES)
    }

    fn manifest_check(&self, ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
        let manifest = ctx.repo_file("Cargo.toml")?;
        let invocation = self
            .env_invocation(&ctx.env_path, "cargo")
            .with_args([
                "metadata",
                "--no-deps",
                "--offline",
                "--format-version",
                "1",
                "--manifest-path",
            ])
            .arg(&manifest);
        Some(ctx.probe(&invocation))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        ctx.require_executable("cargo")?;

        if ctx.repo_file("Cargo.toml").is_some() {
            if let Some(repo) = &ctx.repo_path {
                info!(repo = %repo.display(), "Installing repository crate");
                self.cargo_install(ctx, &[OsStr::new("--path"), repo.as_os_str()])?;
            }
        }
        Ok(())
    }

    /// Each dependency is `name` or `name:version`; one `cargo install` per crate
    fn install_dependencies(
        &self,
        ctx: &EnvironmentContext<'_>,
        dependencies: &[String],
    ) -> Result<()> {
        for dependency in dependencies {
            let (name, version) = split_versioned(dependency);
            let mut args = vec![OsStr::new(name)];
            if let Some(version) = version {
                args.extend([OsStr::new("--version"), OsStr::new(version)]);
            }
            self.cargo_install(ctx, &args)?;
        }
        Ok(())
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self
            .base
            .isolated_environment(&[env_path.join("bin")], HOST_VARIABLES);
        if let Some(cargo_home) = toolchain_home("CARGO_HOME", ".cargo") {
            env.set_path_var("CARGO_HOME", &cargo_home);
        }
        if let Some(rustup_home) = toolchain_home("RUSTUP_HOME", ".rustup") {
            env.set_path_var("RUSTUP_HOME", &rustup_home);
        }
        env
    }
}
