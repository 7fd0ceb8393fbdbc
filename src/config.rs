// Settings handling for hookenv
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, EnvError, Result};
use crate::logging::utils::config_loading_span;
use crate::logging::LogFormat;

/// Settings file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "hookenv.yaml";

/// Overrides every other cache directory source except the CLI flag
pub const HOME_ENV_VAR: &str = "HOOKENV_HOME";

const CACHE_SUBDIR: &str = "hookenv";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Base directory for environments of repositories without a local checkout
    pub cache_dir: Option<PathBuf>,
    /// Version requested for a language when a setup call names none
    #[serde(default)]
    pub default_language_version: HashMap<String, String>,
    /// pretty, compact or json
    pub log_format: Option<String>,
}

impl Settings {
    /// Load settings from an explicit path; a missing file is an error
    pub fn from_file(path: &Path) -> Result<Self> {
        let span = config_loading_span(path);
        let _enter = span.enter();

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
                suggestion: Some(format!(
                    "Create {} or drop the --config flag",
                    path.display()
                )),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_with_context(&content, Some(path))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_yaml_with_context(yaml, None)
    }

    /// Explicit `--config` must exist; the default file is optional
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_yaml_with_context(yaml: &str, file_path: Option<&Path>) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Settings = serde_yaml::from_str(yaml).map_err(|e| {
            let mut config_error = *Box::<ConfigError>::from(e);
            if let ConfigError::InvalidYaml {
                file_path: ref mut path,
                ..
            } = config_error
            {
                *path = file_path.map(Path::to_path_buf);
            }
            EnvError::Config(Box::new(config_error))
        })?;

        settings.validate(file_path)?;
        Ok(settings)
    }

    fn validate(&self, file_path: Option<&Path>) -> Result<()> {
        if let Some(format) = &self.log_format {
            format.parse::<LogFormat>().map_err(|e| match e {
                ConfigError::InvalidValue {
                    message,
                    field,
                    value,
                    ..
                } => ConfigError::InvalidValue {
                    message,
                    field,
                    value,
                    file_path: file_path.map(Path::to_path_buf),
                },
                other => other,
            })?;
        }

        if let Some(cache_dir) = &self.cache_dir {
            if cache_dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    message: "cache_dir must not be empty".to_string(),
                    field: "cache_dir".to_string(),
                    value: String::new(),
                    file_path: file_path.map(Path::to_path_buf),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn log_format(&self) -> Option<LogFormat> {
        self.log_format
            .as_deref()
            .and_then(|format| format.parse().ok())
    }

    /// The request itself wins; otherwise the configured default for the language
    pub fn language_version<'a>(&'a self, language: &str, requested: &'a str) -> &'a str {
        if !requested.is_empty() {
            return requested;
        }
        self.default_language_version
            .get(language)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cache directory by precedence: flag, `HOOKENV_HOME`, settings, `XDG_CACHE_HOME`,
    /// then the platform cache directory. An explicitly empty flag means no cache
    /// directory at all.
    pub fn resolve_cache_dir(&self, flag: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = flag {
            return (!dir.as_os_str().is_empty()).then(|| dir.to_path_buf());
        }
        if let Some(home) = non_empty_env(HOME_ENV_VAR) {
            return Some(PathBuf::from(home));
        }
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        if let Some(xdg) = non_empty_env("XDG_CACHE_HOME") {
            return Some(PathBuf::from(xdg).join(CACHE_SUBDIR));
        }
        dirs::cache_dir().map(|dir| dir.join(CACHE_SUBDIR))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
