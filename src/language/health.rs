// Two-tier health checking for existing environments
//
// Probe failures are expected and recoverable: they are collected as
// HealthCheckError values and only ever leave this module as HealthStatus::Broken.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::process::ToolRunner;
use crate::storage::StateStore;

use super::environment::HealthStatus;
use super::traits::{DriftPolicy, EnvironmentContext, Language};

/// Why a probe considered an environment unusable
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("executable '{name}' not found on PATH")]
    MissingExecutable { name: String },

    #[error("expected {} to exist", path.display())]
    MissingPath { path: PathBuf },

    #[error("probe `{command}` failed: {output}")]
    ProbeFailed { command: String, output: String },

    #[error("probe `{command}` could not run: {error}")]
    ProbeError { command: String, error: String },

    #[error("install state marker missing")]
    NotInstalled,

    #[error("install state unreadable: {error}")]
    StateUnreadable { error: String },

    #[error("dependencies changed: installed {installed:?}, requested {requested:?}")]
    DependencyDrift {
        installed: Vec<String>,
        requested: Vec<String>,
    },
}

pub type HealthResult = std::result::Result<(), HealthCheckError>;

/// Every executable must be on the search path; the first missing one is named
pub fn require_executables(runner: &dyn ToolRunner, names: &[&str]) -> HealthResult {
    for name in names {
        if runner.find_executable(name).is_none() {
            return Err(HealthCheckError::MissingExecutable {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

pub fn require_path(path: &Path) -> HealthResult {
    if path.exists() {
        Ok(())
    } else {
        Err(HealthCheckError::MissingPath {
            path: path.to_path_buf(),
        })
    }
}

/// Outcome of assessing one environment
#[derive(Debug)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub reason: Option<HealthCheckError>,
}

impl HealthReport {
    fn absent() -> Self {
        Self {
            status: HealthStatus::Absent,
            reason: None,
        }
    }

    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            reason: None,
        }
    }

    fn broken(reason: HealthCheckError) -> Self {
        Self {
            status: HealthStatus::Broken,
            reason: Some(reason),
        }
    }
}

/// Combines the state marker, the base probe, the manifest probe and the language's
/// drift policy into a single status.
pub struct HealthChecker<'a> {
    language: &'a dyn Language,
    store: StateStore,
}

impl<'a> HealthChecker<'a> {
    pub fn new(language: &'a dyn Language, store: StateStore) -> Self {
        Self { language, store }
    }

    pub fn assess(
        &self,
        ctx: &EnvironmentContext<'_>,
        requested_dependencies: &[String],
    ) -> HealthReport {
        // A dangling link at the path still occupies it
        if std::fs::symlink_metadata(&ctx.env_path).is_err() {
            return HealthReport::absent();
        }

        let report = match self.check(ctx, requested_dependencies) {
            Ok(()) => HealthReport::healthy(),
            Err(reason) => HealthReport::broken(reason),
        };

        debug!(
            language = ctx.language,
            path = %ctx.env_path.display(),
            status = %report.status,
            reason = ?report.reason,
            "Environment health assessed"
        );
        report
    }

    pub fn status(
        &self,
        ctx: &EnvironmentContext<'_>,
        requested_dependencies: &[String],
    ) -> HealthStatus {
        self.assess(ctx, requested_dependencies).status
    }

    fn check(&self, ctx: &EnvironmentContext<'_>, requested: &[String]) -> HealthResult {
        if !self.store.is_installed(&ctx.env_path) {
            return Err(HealthCheckError::NotInstalled);
        }

        self.language.health_check(ctx)?;

        if let Some(manifest_result) = self.language.manifest_check(ctx) {
            manifest_result?;
        }

        if self.language.drift_policy() == DriftPolicy::Checked {
            let state = self
                .store
                .read_state(&ctx.env_path)
                .map_err(|e| HealthCheckError::StateUnreadable {
                    error: e.to_string(),
                })?
                .unwrap_or_default();

            if !state.matches(requested) {
                return Err(HealthCheckError::DependencyDrift {
                    installed: state.additional_dependencies,
                    requested: requested.to_vec(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as EnvResult;
    use crate::process::{ProcessEnvironment, ToolInvocation, ToolOutput};
    use crate::language::environment::NamingStyle;
    use crate::language::version::ResolvedVersion;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct NoTools;

    impl ToolRunner for NoTools {
        fn run(&self, _invocation: &ToolInvocation) -> EnvResult<ToolOutput> {
            Ok(ToolOutput::default())
        }

        fn find_executable(&self, name: &str) -> Option<PathBuf> {
            (name == "present").then(|| PathBuf::from("/usr/bin/present"))
        }
    }

    struct StubLanguage {
        runner: NoTools,
        base_ok: AtomicBool,
        manifest: Option<bool>,
        drift: DriftPolicy,
    }

    impl StubLanguage {
        fn new(drift: DriftPolicy) -> Self {
            Self {
                runner: NoTools,
                base_ok: AtomicBool::new(true),
                manifest: None,
                drift,
            }
        }
    }

    impl Language for StubLanguage {
        fn language_name(&self) -> &str {
            "stub"
        }
        fn drift_policy(&self) -> DriftPolicy {
            self.drift
        }
        fn runner(&self) -> &dyn ToolRunner {
            &self.runner
        }
        fn resolve_version(&self, _requested: &str) -> ResolvedVersion {
            ResolvedVersion::same("default")
        }
        fn invalidate_default_version(&self) {}
        fn health_check(&self, _ctx: &EnvironmentContext<'_>) -> HealthResult {
            if self.base_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(HealthCheckError::MissingExecutable {
                    name: "stub".to_string(),
                })
            }
        }
        fn manifest_check(&self, _ctx: &EnvironmentContext<'_>) -> Option<HealthResult> {
            self.manifest.map(|ok| {
                if ok {
                    Ok(())
                } else {
                    Err(HealthCheckError::ProbeFailed {
                        command: "stub check".to_string(),
                        output: "unresolved".to_string(),
                    })
                }
            })
        }
        fn create_environment(&self, _ctx: &EnvironmentContext<'_>) -> EnvResult<()> {
            Ok(())
        }
        fn install_dependencies(
            &self,
            _ctx: &EnvironmentContext<'_>,
            _dependencies: &[String],
        ) -> EnvResult<()> {
            Ok(())
        }
        fn process_environment(&self, _env_path: &Path) -> ProcessEnvironment {
            ProcessEnvironment::new()
        }
    }

    fn context<'a>(language: &'a StubLanguage, env_path: &Path) -> EnvironmentContext<'a> {
        EnvironmentContext::new(
            language,
            env_path.to_path_buf(),
            None,
            ResolvedVersion::same("default"),
        )
    }

    fn env_dir(temp: &TempDir) -> PathBuf {
        temp.path()
            .join(NamingStyle::EnvSuffix.directory_name("stub", "default"))
    }

    #[test]
    fn test_require_executables_names_missing_tool() {
        assert!(require_executables(&NoTools, &["present"]).is_ok());
        let err = require_executables(&NoTools, &["present", "cargo", "rustc"]).unwrap_err();
        assert!(matches!(
            err,
            HealthCheckError::MissingExecutable { ref name } if name == "cargo"
        ));
    }

    #[test]
    fn test_absent_when_directory_missing() {
        let temp = TempDir::new().unwrap();
        let language = StubLanguage::new(DriftPolicy::PresenceOnly);
        let ctx = context(&language, &env_dir(&temp));
        let checker = HealthChecker::new(&language, StateStore::new());
        assert_eq!(checker.status(&ctx, &[]), HealthStatus::Absent);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_link_is_broken_not_absent() {
        let temp = TempDir::new().unwrap();
        let path = env_dir(&temp);
        std::os::unix::fs::symlink(temp.path().join("missing-target"), &path).unwrap();

        let language = StubLanguage::new(DriftPolicy::PresenceOnly);
        let ctx = context(&language, &path);
        let checker = HealthChecker::new(&language, StateStore::new());
        assert_eq!(checker.status(&ctx, &[]), HealthStatus::Broken);
    }

    #[test]
    fn test_missing_sentinel_is_broken() {
        let temp = TempDir::new().unwrap();
        let path = env_dir(&temp);
        std::fs::create_dir_all(&path).unwrap();

        let language = StubLanguage::new(DriftPolicy::PresenceOnly);
        let ctx = context(&language, &path);
        let report = HealthChecker::new(&language, StateStore::new()).assess(&ctx, &[]);
        assert_eq!(report.status, HealthStatus::Broken);
        assert!(matches!(report.reason, Some(HealthCheckError::NotInstalled)));
    }

    #[test]
    fn test_base_and_manifest_probes() {
        let temp = TempDir::new().unwrap();
        let path = env_dir(&temp);
        std::fs::create_dir_all(&path).unwrap();
        StateStore::new().write_state(&path, &[]).unwrap();

        let mut language = StubLanguage::new(DriftPolicy::PresenceOnly);
        {
            let ctx = context(&language, &path);
            let checker = HealthChecker::new(&language, StateStore::new());
            assert_eq!(checker.status(&ctx, &[]), HealthStatus::Healthy);
        }

        language.base_ok.store(false, Ordering::SeqCst);
        {
            let ctx = context(&language, &path);
            let checker = HealthChecker::new(&language, StateStore::new());
            assert_eq!(checker.status(&ctx, &[]), HealthStatus::Broken);
        }

        language.base_ok.store(true, Ordering::SeqCst);
        language.manifest = Some(false);
        let ctx = context(&language, &path);
        let checker = HealthChecker::new(&language, StateStore::new());
        assert_eq!(checker.status(&ctx, &[]), HealthStatus::Broken);
    }

    #[test]
    fn test_drift_only_matters_when_checked() {
        let temp = TempDir::new().unwrap();
        let path = env_dir(&temp);
        std::fs::create_dir_all(&path).unwrap();
        StateStore::new()
            .write_state(&path, &["a".to_string()])
            .unwrap();
        let requested = vec!["a".to_string(), "b".to_string()];

        let presence_only = StubLanguage::new(DriftPolicy::PresenceOnly);
        let ctx = context(&presence_only, &path);
        let checker = HealthChecker::new(&presence_only, StateStore::new());
        assert_eq!(checker.status(&ctx, &requested), HealthStatus::Healthy);

        let checked = StubLanguage::new(DriftPolicy::Checked);
        let ctx = context(&checked, &path);
        let checker = HealthChecker::new(&checked, StateStore::new());
        let report = checker.assess(&ctx, &requested);
        assert_eq!(report.status, HealthStatus::Broken);
        assert!(matches!(
            report.reason,
            Some(HealthCheckError::DependencyDrift { .. })
        ));
        assert_eq!(
            checker.status(&ctx, &["a".to_string()]),
            HealthStatus::Healthy
        );
    }
}
