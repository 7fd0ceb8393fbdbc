// Install state markers kept inside each provisioned environment
//
// `.install_state_v1` records the additional dependencies that were installed,
// `.install_state_v2` is a zero-byte sentinel written once provisioning completed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, StateError};

pub const STATE_FILE_V1: &str = ".install_state_v1";
pub const STATE_FILE_V2: &str = ".install_state_v2";

/// Persisted record of what was installed into an environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    #[serde(default)]
    pub additional_dependencies: Vec<String>,
}

impl InstallState {
    pub fn new(dependencies: &[String]) -> Self {
        Self {
            additional_dependencies: dependencies.to_vec(),
        }
    }

    /// Dependencies as a set; order and duplicates are irrelevant for comparison
    pub fn dependency_set(&self) -> BTreeSet<&str> {
        self.additional_dependencies
            .iter()
            .map(String::as_str)
            .collect()
    }

    pub fn matches(&self, requested: &[String]) -> bool {
        self.dependency_set() == requested.iter().map(String::as_str).collect()
    }
}

/// Reads and writes install state markers for environment directories
#[derive(Debug, Clone, Copy, Default)]
pub struct StateStore;

impl StateStore {
    pub fn new() -> Self {
        Self
    }

    pub fn state_path(env_path: &Path) -> PathBuf {
        env_path.join(STATE_FILE_V1)
    }

    pub fn sentinel_path(env_path: &Path) -> PathBuf {
        env_path.join(STATE_FILE_V2)
    }

    /// True once provisioning completed at least once. Says nothing about health.
    pub fn is_installed(&self, env_path: &Path) -> bool {
        Self::sentinel_path(env_path).is_file()
    }

    /// Record the dependency set and mark the environment installed.
    ///
    /// The JSON record goes through a temp file in the environment directory and is
    /// renamed into place; the sentinel is written only after the rename succeeded.
    pub fn write_state(&self, env_path: &Path, dependencies: &[String]) -> Result<()> {
        let state_path = Self::state_path(env_path);
        let state = InstallState::new(dependencies);

        let contents = serde_json::to_vec(&state).map_err(|e| StateError::Write {
            path: state_path.clone(),
            error: e.to_string(),
        })?;

        let write_error = |e: std::io::Error| StateError::Write {
            path: state_path.clone(),
            error: e.to_string(),
        };

        let mut temp_file = tempfile::NamedTempFile::new_in(env_path).map_err(write_error)?;
        temp_file.write_all(&contents).map_err(write_error)?;
        temp_file.flush().map_err(write_error)?;
        temp_file
            .persist(&state_path)
            .map_err(|e| write_error(e.error))?;

        let sentinel_path = Self::sentinel_path(env_path);
        fs::File::create(&sentinel_path).map_err(|e| StateError::Write {
            path: sentinel_path.clone(),
            error: e.to_string(),
        })?;

        debug!(
            path = %env_path.display(),
            dependency_count = dependencies.len(),
            "Install state written"
        );
        Ok(())
    }

    /// Read the recorded state. `Ok(None)` when no record exists.
    pub fn read_state(&self, env_path: &Path) -> Result<Option<InstallState>> {
        let state_path = Self::state_path(env_path);
        let contents = match fs::read(&state_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::Read {
                    path: state_path,
                    error: e.to_string(),
                }
                .into())
            }
        };

        let state = serde_json::from_slice(&contents).map_err(|e| StateError::Corrupt {
            path: state_path,
            error: e.to_string(),
        })?;
        Ok(Some(state))
    }
}
