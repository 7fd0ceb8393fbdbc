// Requested-version normalization and the memoized default version

use parking_lot::RwLock;

pub const DEFAULT_VERSION: &str = "default";
pub const SYSTEM_VERSION: &str = "system";

/// Result of resolving a requested version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Token embedded in the environment directory name
    pub naming: String,
    /// Version handed to the toolchain when creating the environment
    pub actual: String,
}

impl ResolvedVersion {
    pub fn same(version: &str) -> Self {
        Self {
            naming: version.to_string(),
            actual: version.to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.naming == SYSTEM_VERSION
    }

    pub fn is_default(&self) -> bool {
        self.naming == DEFAULT_VERSION
    }

    /// The actual version when it names a concrete release
    pub fn explicit(&self) -> Option<&str> {
        match self.actual.as_str() {
            DEFAULT_VERSION | SYSTEM_VERSION => None,
            other => Some(other),
        }
    }
}

/// What an empty request turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyRequest {
    /// Always `default`, even when a system runtime exists
    AlwaysDefault,
    /// `system` when the language's runtime probe finds one, otherwise `default`
    SystemIfAvailable,
}

/// What an explicit request (anything but empty/`system`/`default`) turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitRequest {
    /// The request names its own environment
    Keep,
    /// The backend has no multi-version management; collapse to `default`
    NormalizeToDefault,
    /// Use the system runtime when one is available, otherwise keep the request
    PreferSystem,
}

/// Per-language version policy. Deliberately not unified across languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    pub empty: EmptyRequest,
    pub explicit: ExplicitRequest,
}

impl VersionPolicy {
    pub const fn new(empty: EmptyRequest, explicit: ExplicitRequest) -> Self {
        Self { empty, explicit }
    }

    /// Resolve `requested`. `default_version` yields the language's resolved default
    /// (`system` or `default`) and is only consulted when the policy needs it.
    pub fn resolve<F>(&self, requested: &str, default_version: F) -> ResolvedVersion
    where
        F: FnOnce() -> String,
    {
        let requested = requested.trim();
        let sanitized = sanitize_version(requested);

        if sanitized.is_empty() {
            return match self.empty {
                EmptyRequest::AlwaysDefault => ResolvedVersion::same(DEFAULT_VERSION),
                EmptyRequest::SystemIfAvailable => ResolvedVersion::same(&default_version()),
            };
        }

        if sanitized == SYSTEM_VERSION || sanitized == DEFAULT_VERSION {
            return ResolvedVersion::same(&sanitized);
        }

        match self.explicit {
            ExplicitRequest::Keep => ResolvedVersion {
                naming: sanitized,
                actual: requested.to_string(),
            },
            ExplicitRequest::NormalizeToDefault => ResolvedVersion::same(DEFAULT_VERSION),
            ExplicitRequest::PreferSystem => {
                if default_version() == SYSTEM_VERSION {
                    ResolvedVersion {
                        naming: SYSTEM_VERSION.to_string(),
                        actual: requested.to_string(),
                    }
                } else {
                    ResolvedVersion {
                        naming: sanitized,
                        actual: requested.to_string(),
                    }
                }
            }
        }
    }
}

/// Make a version usable as a single path component
fn sanitize_version(version: &str) -> String {
    version
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Memoized "resolved default version" owned by a provisioner instance.
///
/// Readers take the read lock; a writer re-checks under the write lock before running
/// the probe, so the probe runs at most once until `invalidate` is called.
#[derive(Debug, Default)]
pub struct DefaultVersionCell {
    cached: RwLock<Option<String>>,
}

impl DefaultVersionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve<F>(&self, probe: F) -> String
    where
        F: FnOnce() -> String,
    {
        if let Some(version) = self.cached.read().as_ref() {
            return version.clone();
        }

        let mut cached = self.cached.write();
        if let Some(version) = cached.as_ref() {
            return version.clone();
        }

        let version = probe();
        *cached = Some(version.clone());
        version
    }

    pub fn get(&self) -> Option<String> {
        self.cached.read().clone()
    }

    /// Drop the memoized value so the next resolution probes again
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }
}
