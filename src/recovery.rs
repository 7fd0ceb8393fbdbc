// Broken environment recovery: decide between reuse, creation and
// remove-then-recreate, and perform the removal

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};
use crate::language::environment::HealthStatus;
use crate::language::health::HealthReport;
use crate::logging::utils::log_broken_environment;

/// What the setup protocol does with an environment after assessing it
#[derive(Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Healthy: return the path without invoking any tool
    Reuse,
    /// Absent: create from scratch
    Create,
    /// Broken: remove recursively, then create
    Recreate { reason: String },
}

impl RecoveryAction {
    pub fn for_report(report: &HealthReport) -> Self {
        match report.status {
            HealthStatus::Healthy => RecoveryAction::Reuse,
            HealthStatus::Absent => RecoveryAction::Create,
            HealthStatus::Broken => RecoveryAction::Recreate {
                reason: report
                    .reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "health check failed".to_string()),
            },
        }
    }
}

/// Removes a broken environment so it can be recreated.
///
/// Recovery is granted once per setup call; the removal itself is never retried and
/// has no fallback location.
#[derive(Debug)]
pub struct BrokenEnvironmentRecovery<'a> {
    language: &'a str,
    attempted: bool,
}

impl<'a> BrokenEnvironmentRecovery<'a> {
    pub fn new(language: &'a str) -> Self {
        Self {
            language,
            attempted: false,
        }
    }

    pub fn attempted(&self) -> bool {
        self.attempted
    }

    /// Remove `path` recursively. Returns `Ok(false)` without touching the filesystem
    /// if recovery was already used by this call.
    pub fn remove_broken(&mut self, path: &Path, reason: &str) -> Result<bool> {
        if self.attempted {
            warn!(
                language = self.language,
                path = %path.display(),
                "Recovery already attempted for this setup call"
            );
            return Ok(false);
        }
        self.attempted = true;

        log_broken_environment(self.language, path, reason);

        remove_environment(path).map_err(|source| ProvisionError::DirectoryRemove {
            language: self.language.to_string(),
            path: path.to_path_buf(),
            source,
        })?;

        info!(language = self.language, path = %path.display(), "Broken environment removed");
        Ok(true)
    }
}

fn remove_environment(path: &Path) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::health::HealthCheckError;
    use tempfile::TempDir;

    #[test]
    fn test_action_for_report() {
        let healthy = HealthReport {
            status: HealthStatus::Healthy,
            reason: None,
        };
        assert_eq!(RecoveryAction::for_report(&healthy), RecoveryAction::Reuse);

        let absent = HealthReport {
            status: HealthStatus::Absent,
            reason: None,
        };
        assert_eq!(RecoveryAction::for_report(&absent), RecoveryAction::Create);

        let broken = HealthReport {
            status: HealthStatus::Broken,
            reason: Some(HealthCheckError::NotInstalled),
        };
        assert_eq!(
            RecoveryAction::for_report(&broken),
            RecoveryAction::Recreate {
                reason: "install state marker missing".to_string()
            }
        );
    }

    #[test]
    fn test_remove_broken_directory() {
        let temp_dir = TempDir::new().unwrap();
        let env = temp_dir.path().join("rustenv-default");
        fs::create_dir_all(env.join("bin")).unwrap();
        fs::write(env.join("bin").join("tool"), b"x").unwrap();

        let mut recovery = BrokenEnvironmentRecovery::new("rust");
        assert!(recovery.remove_broken(&env, "test").unwrap());
        assert!(!env.exists());
        assert!(recovery.attempted());
    }

    #[test]
    fn test_remove_broken_plain_file() {
        let temp_dir = TempDir::new().unwrap();
        let env = temp_dir.path().join("nodeenv-system");
        fs::write(&env, b"not a directory").unwrap();

        let mut recovery = BrokenEnvironmentRecovery::new("node");
        assert!(recovery.remove_broken(&env, "test").unwrap());
        assert!(!env.exists());
    }

    #[test]
    fn test_recovery_only_once_per_call() {
        let temp_dir = TempDir::new().unwrap();
        let env = temp_dir.path().join("pythonenv-default");
        fs::create_dir_all(&env).unwrap();

        let mut recovery = BrokenEnvironmentRecovery::new("python");
        assert!(recovery.remove_broken(&env, "first").unwrap());

        fs::create_dir_all(&env).unwrap();
        assert!(!recovery.remove_broken(&env, "second").unwrap());
        assert!(env.exists());
    }

    #[test]
    fn test_removal_failure_is_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("never-created");

        let mut recovery = BrokenEnvironmentRecovery::new("ruby");
        let err = recovery.remove_broken(&missing, "test").unwrap_err();
        assert!(err.to_string().contains("failed to remove broken environment"));
    }
}
