// Node.js language backend: system-node symlink environments or nodeenv-built ones,
// with global npm installs into the environment prefix

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::process::{ProcessEnvironment, ToolInvocation, ToolRunner};

use super::base::{bin_dir, exe_name, BaseLanguagePlugin};
use super::dependency::StagingGuard;
use super::health::{HealthCheckError, HealthResult};
use super::traits::{EnvironmentContext, Language};
use super::version::{EmptyRequest, ExplicitRequest, ResolvedVersion, VersionPolicy};

const NODE_POLICY: VersionPolicy =
    VersionPolicy::new(EmptyRequest::SystemIfAvailable, ExplicitRequest::PreferSystem);

/// Executables linked into `bin/` of a system-mode environment
const SYSTEM_LINKS: &[&str] = &["node", "npm"];

const NPM_INSTALL_FLAGS: &[&str] = &["--no-progress", "--no-save", "--no-fund", "--no-audit"];

/// Node.js language plugin
pub struct NodejsLanguagePlugin {
    base: BaseLanguagePlugin,
}

impl NodejsLanguagePlugin {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            base: BaseLanguagePlugin::new("node", runner, NODE_POLICY, &["node"]),
        }
    }

    /// Directory npm installs global packages into for this prefix
    pub fn node_modules_dir(env_path: &Path) -> PathBuf {
        if cfg!(windows) {
            bin_dir(env_path).join("node_modules")
        } else {
            env_path.join("lib").join("node_modules")
        }
    }

    fn npm_invocation(&self, env_path: &Path) -> ToolInvocation {
        let local_npm = bin_dir(env_path).join(exe_name("npm"));
        let program = if local_npm.exists() {
            local_npm.to_string_lossy().into_owned()
        } else {
            "npm".to_string()
        };
        self.env_invocation(env_path, &program)
    }

    /// Make sure `bin/<name>` exists, linking the system executable when it is
    /// missing. Fails only when there is nothing to link to.
    fn repair_link(&self, ctx: &EnvironmentContext<'_>, name: &str) -> HealthResult {
        let link = bin_dir(&ctx.env_path).join(exe_name(name));
        if link.exists() {
            return Ok(());
        }

        let target = self
            .base
            .runner
            .find_executable(name)
            .ok_or_else(|| HealthCheckError::MissingExecutable {
                name: name.to_string(),
            })?;

        debug!(link = %link.display(), target = %target.display(), "Repairing runtime link");
        link_executable(&target, &link).map_err(|e| HealthCheckError::ProbeError {
            command: format!("link {}", link.display()),
            error: e.to_string(),
        })?;

        if link.exists() {
            Ok(())
        } else {
            Err(HealthCheckError::MissingPath { path: link })
        }
    }

    fn create_system_links(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        let bin = bin_dir(&ctx.env_path);
        for name in SYSTEM_LINKS {
            let target = ctx.require_executable(name)?;
            let link = bin.join(exe_name(name));
            link_executable(&target, &link)
                .map_err(|source| ctx.directory_error(&link, source))?;
        }
        Ok(())
    }

    fn create_with_nodeenv(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        let nodeenv = ctx.require_executable("nodeenv")?;
        let version = ctx.version.explicit().unwrap_or("lts");
        let invocation = ToolInvocation::new(nodeenv.to_string_lossy())
            .with_args(["--prebuilt", "--clean-src", "-n", version])
            .arg(&ctx.env_path);
        ctx.run_step("nodeenv", &invocation)?;
        Ok(())
    }

    /// `npm pack` the repository and install the tarball globally into the
    /// environment. The tarball is removed whether or not the install succeeds.
    fn install_repository(&self, ctx: &EnvironmentContext<'_>, repo: &Path) -> Result<()> {
        let mut staging = StagingGuard::new();

        let pack = self
            .npm_invocation(&ctx.env_path)
            .arg("pack")
            .with_working_dir(repo);
        let output = ctx.run_step("npm pack", &pack)?;

        let tarball = output
            .stdout()
            .lines()
            .map(str::trim)
            .filter(|line| line.ends_with(".tgz"))
            .last()
            .map(|name| repo.join(name));

        let Some(tarball) = tarball else {
            debug!(repo = %repo.display(), "npm pack produced no tarball");
            return Ok(());
        };
        staging.track(&tarball);

        let install = self
            .npm_invocation(&ctx.env_path)
            .with_args(["install", "--global"])
            .with_args(NPM_INSTALL_FLAGS.iter().copied())
            .arg(&tarball)
            .with_working_dir(repo);
        ctx.run_step("npm install", &install)?;
        Ok(())
    }
}

/// Replace `link` (dangling or not) with a symlink to `target`
fn link_executable(target: &Path, link: &Path) -> io::Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }
    symlink_file(target, link)
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link).or_else(|_| fs::copy(target, link).map(|_| ()))
}

impl Language for NodejsLanguagePlugin {
    fn language_name(&self) -> &str {
        self.base.name
    }

    fn runner(&self) -> &dyn ToolRunner {
        self.base.runner()
    }

    fn resolve_version(&self, requested: &str) -> ResolvedVersion {
        self.base.resolve_version_with(requested, !cfg!(windows))
    }

    fn invalidate_default_version(&self) {
        self.base.invalidate_default_version();
    }

    fn health_check(&self, ctx: &EnvironmentContext<'_>) -> HealthResult {
        if ctx.version.is_system() {
            for name in SYSTEM_LINKS {
                self.repair_link(ctx, name)?;
            }
            return Ok(());
        }

        let node = bin_dir(&ctx.env_path).join(exe_name("node"));
        if node.exists() {
            Ok(())
        } else {
            Err(HealthCheckError::MissingPath { path: node })
        }
    }

    fn manifest_check(&self, ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
        ctx.repo_file("package.json")?;
        if !Self::node_modules_dir(&ctx.env_path).is_dir() {
            return None;
        }

        let invocation = self
            .npm_invocation(&ctx.env_path)
            .with_args(["ls", "--global", "--depth=0", "--prefix"])
            .arg(&ctx.env_path);
        Some(ctx.probe(&invocation))
    }

    fn create_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<()> {
        if ctx.version.is_system() {
            self.create_system_links(ctx)?;
        } else {
            self.create_with_nodeenv(ctx)?;
        }

        if let Some(repo) = ctx.repo_file("package.json").and(ctx.repo_path.as_deref()) {
            info!(repo = %repo.display(), "Installing repository package");
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

        let mut invocation = self
            .npm_invocation(&ctx.env_path)
            .with_args(["install", "--global"])
            .with_args(NPM_INSTALL_FLAGS.iter().copied())
            .with_args(dependencies);
        if let Some(repo) = &ctx.repo_path {
            invocation = invocation.with_working_dir(repo);
        }
        ctx.run_step("npm install", &invocation)?;
        Ok(())
    }

    fn process_environment(&self, env_path: &Path) -> ProcessEnvironment {
        let mut env = self.base.isolated_environment(
            &[bin_dir(env_path)],
            &["NPM_CONFIG_USERCONFIG", "npm_config_userconfig"],
        );
        env.set_path_var("NODE_VIRTUAL_ENV", env_path)
            .set_path_var("NPM_CONFIG_PREFIX", env_path)
            .set_path_var("npm_config_prefix", env_path)
            .set_path_var("NODE_PATH", &Self::node_modules_dir(env_path));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::testing::{fail_with, succeed_with, FakeRunner};
    use tempfile::TempDir;

    fn plugin(runner: &Arc<FakeRunner>) -> NodejsLanguagePlugin {
        NodejsLanguagePlugin::new(runner.clone())
    }

    fn context<'a>(
        plugin: &'a NodejsLanguagePlugin,
        env_path: &Path,
        repo: Option<&Path>,
        version: &str,
    ) -> EnvironmentContext<'a> {
        EnvironmentContext::new(
            plugin,
            env_path.to_path_buf(),
            repo.map(Path::to_path_buf),
            ResolvedVersion::same(version),
        )
    }

    #[test]
    fn test_version_prefers_system_node() {
        let runner = Arc::new(FakeRunner::with_tools(&["node", "npm"]));
        let node = plugin(&runner);
        if cfg!(windows) {
            assert_eq!(node.resolve_version("").naming, "default");
        } else {
            assert_eq!(node.resolve_version("").naming, "system");
            assert_eq!(node.resolve_version("18.0.0").naming, "system");
        }

        let managed = plugin(&Arc::new(FakeRunner::with_tools(&[])));
        assert_eq!(managed.resolve_version("").naming, "default");
        assert_eq!(managed.resolve_version("18.0.0").naming, "18.0.0");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_mode_creates_links_without_running_tools() {
        let temp = TempDir::new().unwrap();
        let env_path = temp.path().join("nodeenv-system");
        fs::create_dir_all(&env_path).unwrap();

        let runner = Arc::new(FakeRunner::with_tools(&["node", "npm"]));
        let node = plugin(&runner);
        let ctx = context(&node, &env_path, Some(temp.path()), "system");

        node.create_environment(&ctx).unwrap();
        node.install_dependencies(&ctx, &[]).unwrap();

        assert!(fs::symlink_metadata(env_path.join("bin/node")).is_ok());
        assert!(fs::symlink_metadata(env_path.join("bin/npm")).is_ok());
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn test_nodeenv_required_for_managed_versions() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::with_tools(&[]));
        let node = plugin(&runner);
        let ctx = context(&node, temp.path(), None, "18.0.0");

        let err = node.create_environment(&ctx).unwrap_err();
        assert!(err.to_string().contains("nodeenv"));
    }

    #[test]
    fn test_nodeenv_arguments() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::with_tools(&["nodeenv"]));
        let node = plugin(&runner);
        let ctx = EnvironmentContext::new(
            &node,
            temp.path().to_path_buf(),
            None,
            ResolvedVersion {
                naming: "default".to_string(),
                actual: "default".to_string(),
            },
        );

        node.create_environment(&ctx).unwrap();
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        let args = invocations[0].args_lossy();
        assert_eq!(&args[..4], &["--prebuilt", "--clean-src", "-n", "lts"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_self_repair_recreates_missing_link() {
        let temp = TempDir::new().unwrap();
        let env_path = temp.path().join("nodeenv-system");
        let system_bin = temp.path().join("system-bin");
        fs::create_dir_all(&env_path).unwrap();
        fs::create_dir_all(&system_bin).unwrap();
        fs::write(system_bin.join("node"), b"#!/bin/sh\n").unwrap();
        fs::write(system_bin.join("npm"), b"#!/bin/sh\n").unwrap();

        let runner =
            Arc::new(FakeRunner::with_tools(&["node", "npm"]).with_tool_dir(&system_bin));
        let node = plugin(&runner);
        let ctx = context(&node, &env_path, None, "system");
        node.create_environment(&ctx).unwrap();

        assert!(node.health_check(&ctx).is_ok());

        fs::remove_file(env_path.join("bin/node")).unwrap();
        assert!(node.health_check(&ctx).is_ok());
        assert!(env_path.join("bin/node").exists());
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn test_self_repair_impossible_without_system_node() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::with_tools(&[]));
        let node = plugin(&runner);
        let ctx = context(&node, temp.path(), None, "system");

        let err = node.health_check(&ctx).unwrap_err();
        assert!(matches!(err, HealthCheckError::MissingExecutable { ref name } if name == "node"));
    }

    #[test]
    fn test_manifest_probe_only_with_package_json_and_modules() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let env_path = temp.path().join("nodeenv-default");
        fs::create_dir_all(&repo).unwrap();
        fs::create_dir_all(NodejsLanguagePlugin::node_modules_dir(&env_path)).unwrap();

        let runner = Arc::new(FakeRunner::with_tools(&["npm"]));
        let node = plugin(&runner);
        let ctx = context(&node, &env_path, Some(&repo), "default");
        assert!(node.manifest_check(&ctx).is_none());

        fs::write(repo.join("package.json"), "{}").unwrap();
        assert!(matches!(node.manifest_check(&ctx), Some(Ok(()))));
        let command = runner.commands().pop().unwrap();
        assert!(command.contains("ls --global --depth=0 --prefix"));
    }

    #[test]
    fn test_pack_tarball_removed_when_install_fails() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let env_path = temp.path().join("nodeenv-default");
        fs::create_dir_all(&repo).unwrap();
        fs::create_dir_all(env_path.join("bin")).unwrap();
        fs::write(env_path.join("bin").join(exe_name("node")), b"").unwrap();
        fs::write(repo.join("package.json"), r#"{"name":"hook"}"#).unwrap();

        let repo_for_runner = repo.clone();
        let runner = Arc::new(
            FakeRunner::with_tools(&["nodeenv", "npm"]).respond_with(move |invocation| {
                let args = invocation.args_lossy();
                match args.first().map(String::as_str) {
                    Some("pack") => {
                        fs::write(repo_for_runner.join("hook-1.0.0.tgz"), b"tgz").unwrap();
                        Some(succeed_with("hook-1.0.0.tgz\n"))
                    }
                    Some("install") => Some(fail_with("npm ERR! boom")),
                    _ => None,
                }
            }),
        );
        let node = plugin(&runner);
        let ctx = context(&node, &env_path, Some(&repo), "default");

        let err = node.create_environment(&ctx).unwrap_err();
        assert!(err.to_string().contains("npm install"));
        assert!(!repo.join("hook-1.0.0.tgz").exists());
    }

    #[test]
    fn test_process_environment() {
        let runner = Arc::new(FakeRunner::with_tools(&[]));
        let node = plugin(&runner);
        let env = node.process_environment(Path::new("/cache/nodeenv-system"));
        assert!(env.get("NPM_CONFIG_USERCONFIG").is_none());
        assert_eq!(env.get("NPM_CONFIG_PREFIX"), Some("/cache/nodeenv-system"));
        assert!(env.get("PATH").unwrap().starts_with("/cache/nodeenv-system"));
    }
}
