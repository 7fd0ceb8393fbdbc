// Environment identity and on-disk naming

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// How an environment directory name is built from the language key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamingStyle {
    /// `<key>env-<version>`, e.g. `nodeenv-system`
    EnvSuffix,
    /// `<key>-<version>`, e.g. `conda-default`
    Dashed,
}

impl NamingStyle {
    pub fn directory_name(&self, language_key: &str, naming_version: &str) -> String {
        match self {
            NamingStyle::EnvSuffix => format!("{language_key}env-{naming_version}"),
            NamingStyle::Dashed => format!("{language_key}-{naming_version}"),
        }
    }

    /// Naming version embedded in `directory_name`, if it belongs to `language_key`
    pub fn parse_version<'a>(&self, language_key: &str, directory_name: &'a str) -> Option<&'a str> {
        let prefix = match self {
            NamingStyle::EnvSuffix => format!("{language_key}env-"),
            NamingStyle::Dashed => format!("{language_key}-"),
        };
        directory_name
            .strip_prefix(prefix.as_str())
            .filter(|version| !version.is_empty())
    }
}

/// Derived status of an environment directory; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Absent,
    Healthy,
    Broken,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Absent => write!(f, "absent"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Broken => write!(f, "broken"),
        }
    }
}

/// (language key, naming version, base directory)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentIdentity {
    pub language: String,
    pub naming_version: String,
    pub base_dir: PathBuf,
    pub style: NamingStyle,
}

impl EnvironmentIdentity {
    /// Pick the base directory: repository path first, cache directory second.
    pub fn new(
        language: &str,
        naming_version: &str,
        repo_path: Option<&Path>,
        cache_dir: Option<&Path>,
        style: NamingStyle,
    ) -> Result<Self> {
        let base_dir = select_base_dir(repo_path, cache_dir).ok_or_else(|| {
            ConfigError::MissingBaseDirectory {
                language: language.to_string(),
            }
        })?;

        Ok(Self {
            language: language.to_string(),
            naming_version: naming_version.to_string(),
            base_dir,
            style,
        })
    }

    pub fn directory_name(&self) -> String {
        self.style
            .directory_name(&self.language, &self.naming_version)
    }

    /// Path used for every filesystem operation on this environment
    pub fn path(&self) -> PathBuf {
        extend_path_length(&self.base_dir.join(self.directory_name()), cfg!(windows))
    }
}

fn select_base_dir(repo_path: Option<&Path>, cache_dir: Option<&Path>) -> Option<PathBuf> {
    fn non_empty(path: Option<&Path>) -> Option<&Path> {
        path.filter(|p| !p.as_os_str().is_empty())
    }

    non_empty(repo_path)
        .or_else(|| non_empty(cache_dir))
        .map(Path::to_path_buf)
}

/// Rewrite absolute paths with the `\\?\` length-extension prefix on Windows.
///
/// Relative paths, UNC paths and already-prefixed paths are returned unchanged, as is
/// every path on other platforms.
pub fn extend_path_length(path: &Path, windows: bool) -> PathBuf {
    if !windows {
        return path.to_path_buf();
    }

    let raw = path.to_string_lossy();
    if raw.starts_with(r"\\") {
        return path.to_path_buf();
    }

    let bytes = raw.as_bytes();
    let is_drive_absolute = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    if !is_drive_absolute {
        return path.to_path_buf();
    }

    PathBuf::from(format!(r"\\?\{}", raw.replace('/', r"\")))
}
