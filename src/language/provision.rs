// Idempotent environment setup shared by every language backend

use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::logging::utils::provision_span;
use crate::process::ProcessEnvironment;
use crate::recovery::{BrokenEnvironmentRecovery, RecoveryAction};
use crate::storage::StateStore;

use super::environment::EnvironmentIdentity;
use super::health::{HealthChecker, HealthReport};
use super::registry::LanguageRegistry;
use super::traits::{EnvironmentContext, Language};
use super::version::{ResolvedVersion, DEFAULT_VERSION};

/// Arguments of one setup call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupRequest {
    pub cache_dir: Option<PathBuf>,
    pub version: String,
    pub repo_path: Option<PathBuf>,
    /// Where the hook repository came from; informational only
    pub repo_url: Option<String>,
    pub additional_dependencies: Vec<String>,
}

impl SetupRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_repo_path(mut self, repo_path: impl Into<PathBuf>) -> Self {
        self.repo_path = Some(repo_path.into());
        self
    }

    pub fn with_repo_url(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = Some(repo_url.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// In-process mutex per environment path.
///
/// Serializes concurrent setup of the same identity inside one process. Different
/// identities never share a lock. Nothing here coordinates separate processes.
#[derive(Default)]
pub struct IdentityLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Drives the setup protocol for any registered language
pub struct Provisioner {
    registry: Arc<LanguageRegistry>,
    store: StateStore,
    locks: IdentityLocks,
}

impl Provisioner {
    pub fn new(registry: Arc<LanguageRegistry>) -> Self {
        Self {
            registry,
            store: StateStore::new(),
            locks: IdentityLocks::new(),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn identity_locks(&self) -> &IdentityLocks {
        &self.locks
    }

    /// Resolve the version and compute the environment path without touching disk
    pub fn resolve(
        &self,
        language: &str,
        request: &SetupRequest,
    ) -> Result<(Arc<dyn Language>, EnvironmentIdentity, ResolvedVersion)> {
        let plugin = self.registry.require_plugin(language)?;
        let resolved = plugin.resolve_version(&request.version);
        let identity = EnvironmentIdentity::new(
            plugin.language_name(),
            &resolved.naming,
            request.repo_path.as_deref(),
            request.cache_dir.as_deref(),
            plugin.naming_style(),
        )?;
        Ok((plugin, identity, resolved))
    }

    pub fn environment_path(&self, language: &str, request: &SetupRequest) -> Result<PathBuf> {
        let (_, identity, _) = self.resolve(language, request)?;
        Ok(identity.path())
    }

    /// Assess the environment a setup call would use, without changing anything
    /// beyond node's link self-repair.
    pub fn status(&self, language: &str, request: &SetupRequest) -> Result<(PathBuf, HealthReport)> {
        let (plugin, identity, resolved) = self.resolve(language, request)?;
        let path = identity.path();
        let ctx = EnvironmentContext::new(
            plugin.as_ref(),
            path.clone(),
            request.repo_path.clone(),
            resolved,
        );
        let report = HealthChecker::new(plugin.as_ref(), self.store)
            .assess(&ctx, &request.additional_dependencies);
        Ok((path, report))
    }

    /// Return a usable environment path, creating or recreating the environment only
    /// when the existing one is absent or broken.
    pub fn setup_environment(&self, language: &str, request: &SetupRequest) -> Result<PathBuf> {
        let (plugin, identity, resolved) = self.resolve(language, request)?;
        let path = identity.path();

        let span = provision_span(plugin.language_name(), &resolved.naming, &path);
        let _enter = span.enter();

        let lock = self.locks.lock_for(&path);
        let _guard = lock.lock();

        let ctx = EnvironmentContext::new(
            plugin.as_ref(),
            path.clone(),
            request.repo_path.clone(),
            resolved,
        );
        let dependencies = &request.additional_dependencies;

        let report = HealthChecker::new(plugin.as_ref(), self.store).assess(&ctx, dependencies);
        let mut recovery = BrokenEnvironmentRecovery::new(ctx.language);

        match RecoveryAction::for_report(&report) {
            RecoveryAction::Reuse => {
                debug!("Reusing healthy environment");
                return Ok(path);
            }
            RecoveryAction::Create => {}
            RecoveryAction::Recreate { reason } => {
                recovery.remove_broken(&path, &reason)?;
            }
        }

        info!(
            repo_url = request.repo_url.as_deref().unwrap_or(""),
            dependency_count = dependencies.len(),
            recreated = recovery.attempted(),
            "Creating environment"
        );

        ctx.create_dir(&path)?;

        plugin.create_environment(&ctx)?;
        plugin.install_dependencies(&ctx, dependencies)?;
        self.store.write_state(&path, dependencies)?;

        info!("Environment ready");
        Ok(path)
    }

    /// Install extra dependencies into an existing environment directory.
    ///
    /// The naming version is recovered from the directory name. The recorded install
    /// state is left as it is.
    pub fn install_dependencies(
        &self,
        language: &str,
        env_path: &Path,
        repo_path: Option<&Path>,
        dependencies: &[String],
    ) -> Result<()> {
        if dependencies.is_empty() {
            return Ok(());
        }

        let plugin = self.registry.require_plugin(language)?;
        let naming = env_path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| {
                plugin
                    .naming_style()
                    .parse_version(plugin.language_name(), name)
            })
            .unwrap_or(DEFAULT_VERSION);

        let lock = self.locks.lock_for(env_path);
        let _guard = lock.lock();

        let ctx = EnvironmentContext::new(
            plugin.as_ref(),
            env_path.to_path_buf(),
            repo_path.map(Path::to_path_buf),
            ResolvedVersion::same(naming),
        );
        plugin.install_dependencies(&ctx, dependencies)
    }

    pub fn process_environment(&self, language: &str, env_path: &Path) -> Result<ProcessEnvironment> {
        let plugin = self.registry.require_plugin(language)?;
        Ok(plugin.process_environment(env_path))
    }

    /// Forget every memoized default version, so the next resolution probes again
    pub fn invalidate_default_versions(&self) {
        for name in self.registry.list_plugins() {
            if let Some(plugin) = self.registry.get_plugin(&name) {
                plugin.invalidate_default_version();
            }
        }
    }
}
