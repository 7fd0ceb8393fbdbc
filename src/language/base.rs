// Base implementation for common language backend functionality

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::process::{ProcessEnvironment, ToolRunner};

use super::version::{
    DefaultVersionCell, ResolvedVersion, VersionPolicy, DEFAULT_VERSION, SYSTEM_VERSION,
};

/// State every language backend carries: its key, the shared tool runner, its version
/// policy and the memoized default version.
pub struct BaseLanguagePlugin {
    pub name: &'static str,
    pub runner: Arc<dyn ToolRunner>,
    pub policy: VersionPolicy,
    /// Executables whose presence makes `system` the default version
    pub system_executables: &'static [&'static str],
    default_version: DefaultVersionCell,
}

impl BaseLanguagePlugin {
    pub fn new(
        name: &'static str,
        runner: Arc<dyn ToolRunner>,
        policy: VersionPolicy,
        system_executables: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            runner,
            policy,
            system_executables,
            default_version: DefaultVersionCell::new(),
        }
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    /// `system` when every system executable is on PATH (and `system_allowed`),
    /// otherwise `default`. Memoized until `invalidate_default_version`.
    pub fn default_version(&self, system_allowed: bool) -> String {
        self.default_version.get_or_resolve(|| {
            let available = system_allowed
                && !self.system_executables.is_empty()
                && self
                    .system_executables
                    .iter()
                    .all(|exe| self.runner.find_executable(exe).is_some());
            tracing::debug!(
                language = self.name,
                system_available = available,
                "Resolved default version"
            );
            if available {
                SYSTEM_VERSION.to_string()
            } else {
                DEFAULT_VERSION.to_string()
            }
        })
    }

    pub fn resolve_version(&self, requested: &str) -> ResolvedVersion {
        self.policy
            .resolve(requested, || self.default_version(true))
    }

    pub fn resolve_version_with(&self, requested: &str, system_allowed: bool) -> ResolvedVersion {
        self.policy
            .resolve(requested, || self.default_version(system_allowed))
    }

    pub fn invalidate_default_version(&self) {
        self.default_version.invalidate();
    }

    /// Inherit the system environment, put `bin_dirs` in front of PATH (first entry
    /// searched first) and drop host configuration variables.
    pub fn isolated_environment(
        &self,
        bin_dirs: &[PathBuf],
        removed_vars: &[&str],
    ) -> ProcessEnvironment {
        let mut env = ProcessEnvironment::inherit_system();
        env.remove_vars(removed_vars);
        for dir in bin_dirs.iter().rev() {
            env.add_to_path(dir);
        }
        env
    }
}

/// Platform-specific name of the environment's executables directory
pub fn bin_dir(env_path: &Path) -> PathBuf {
    if cfg!(windows) {
        env_path.join("Scripts")
    } else {
        env_path.join("bin")
    }
}

/// Platform-specific executable file name
pub fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::language::version::{EmptyRequest, ExplicitRequest};
    use crate::process::{ToolInvocation, ToolOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLookups {
        lookups: AtomicUsize,
    }

    impl ToolRunner for CountingLookups {
        fn run(&self, _invocation: &ToolInvocation) -> Result<ToolOutput> {
            Ok(ToolOutput::default())
        }

        fn find_executable(&self, name: &str) -> Option<PathBuf> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Some(PathBuf::from("/usr/bin").join(name))
        }
    }

    fn plugin(runner: Arc<CountingLookups>) -> BaseLanguagePlugin {
        BaseLanguagePlugin::new(
            "perl",
            runner,
            VersionPolicy::new(
                EmptyRequest::SystemIfAvailable,
                ExplicitRequest::NormalizeToDefault,
            ),
            &["perl"],
        )
    }

    #[test]
    fn test_default_version_is_memoized() {
        let runner = Arc::new(CountingLookups::default());
        let base = plugin(runner.clone());

        assert_eq!(base.resolve_version("").naming, "system");
        assert_eq!(base.resolve_version("").naming, "system");
        assert_eq!(runner.lookups.load(Ordering::SeqCst), 1);

        base.invalidate_default_version();
        assert_eq!(base.resolve_version("").naming, "system");
        assert_eq!(runner.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_system_not_allowed_resolves_default() {
        let runner = Arc::new(CountingLookups::default());
        let base = plugin(runner);
        assert_eq!(base.resolve_version_with("", false).naming, "default");
    }

    #[test]
    fn test_isolated_environment_path_order() {
        let base = plugin(Arc::new(CountingLookups::default()));
        let env = base.isolated_environment(
            &[PathBuf::from("/env/first"), PathBuf::from("/env/second")],
            &["PERL5OPT"],
        );
        let path = env.get("PATH").unwrap();
        assert!(path.starts_with("/env/first"));
        let second = path.find("/env/second").unwrap();
        assert!(second > 0);
        assert!(env.get("PERL5OPT").is_none());
    }
}
