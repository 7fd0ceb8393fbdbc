// Language registration: the single place that knows every language key

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::process::ToolRunner;

use super::traits::Language;

/// Language backend registry
pub struct LanguageRegistry {
    plugins: DashMap<String, Arc<dyn Language>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self {
            plugins: DashMap::new(),
        }
    }

    /// Registry with every built-in language sharing one tool runner
    pub fn with_builtin(runner: Arc<dyn ToolRunner>) -> Self {
        let registry = Self::new();
        registry.load_builtin_plugins(runner);
        registry
    }

    pub fn register_plugin(&self, language: Arc<dyn Language>) {
        let name = language.language_name().to_string();
        debug!(language = %name, "Registering language backend");
        self.plugins.insert(name, language);
    }

    pub fn get_plugin(&self, language_name: &str) -> Option<Arc<dyn Language>> {
        self.plugins
            .get(language_name)
            .map(|entry| entry.value().clone())
    }

    /// Like `get_plugin`, but an unknown key is an error naming the known ones
    pub fn require_plugin(&self, language_name: &str) -> Result<Arc<dyn Language>> {
        self.get_plugin(language_name).ok_or_else(|| {
            ProvisionError::UnknownLanguage {
                language: language_name.to_string(),
                available: self.list_plugins(),
            }
            .into()
        })
    }

    /// Registered language keys, sorted
    pub fn list_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plugins
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn load_builtin_plugins(&self, runner: Arc<dyn ToolRunner>) {
        self.register_plugin(Arc::new(super::nodejs::NodejsLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::python::PythonLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::ruby::RubyLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::rust::RustLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::conda::CondaLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::perl::PerlLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::r::RLanguagePlugin::new(runner.clone())));
        self.register_plugin(Arc::new(super::dart::DartLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::dotnet::DotnetLanguagePlugin::new(
            runner.clone(),
        )));
        self.register_plugin(Arc::new(super::coursier::CoursierLanguagePlugin::new(
            runner,
        )));
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
