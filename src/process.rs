// Process invocation for external toolchain commands: the ToolRunner seam,
// invocation/output types, and the derived-environment builder

use crate::error::{ProcessError, Result};
use crate::logging::utils::log_tool_invocation;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::trace;

/// A single external command: program, arguments, working directory and environment
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    /// Complete environment for the child. `None` inherits the caller's environment.
    pub environment: Option<HashMap<String, String>>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            environment: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_environment(mut self, env: HashMap<String, String>) -> Self {
        self.environment = Some(env);
        self
    }

    /// Arguments rendered lossily, for logs and assertions
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished tool
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// stdout followed by stderr, as shown to users when a tool fails
    pub fn combined_output(&self) -> String {
        let mut combined = self.stdout();
        let stderr = self.stderr();
        if !combined.is_empty() && !stderr.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
        combined
    }
}

/// Narrow interface over external executables.
///
/// A non-zero exit is reported through `ToolOutput::exit_code`, not as an `Err`;
/// `Err` means the program could not be run at all.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;

    /// Look a program up on the search path
    fn find_executable(&self, name: &str) -> Option<PathBuf>;

    fn is_available(&self, name: &str) -> bool {
        self.find_executable(name).is_some()
    }
}

/// ToolRunner backed by `std::process::Command`; blocks until the child exits
#[derive(Debug, Default, Clone)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ToolRunner for ProcessToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let start_time = Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        if let Some(ref dir) = invocation.working_dir {
            cmd.current_dir(dir);
        }

        if let Some(ref environment) = invocation.environment {
            cmd.env_clear();
            cmd.envs(environment);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        log_tool_invocation(&invocation.to_string(), invocation.working_dir.as_deref());
        let output = cmd.output().map_err(|e| ProcessError::SpawnFailed {
            command: invocation.to_string(),
            error: e.to_string(),
        })?;

        trace!(
            command = %invocation,
            exit_code = ?output.status.code(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Tool finished"
        );

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Environment builder for tool invocations inside a provisioned environment
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvironment {
    base_env: HashMap<String, String>,
}

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inherit_system() -> Self {
        Self {
            base_env: std::env::vars().collect(),
        }
    }

    pub fn set_var(&mut self, key: &str, value: impl AsRef<str>) -> &mut Self {
        self.base_env
            .insert(key.to_string(), value.as_ref().to_string());
        self
    }

    pub fn set_path_var(&mut self, key: &str, value: &Path) -> &mut Self {
        self.set_var(key, value.to_string_lossy())
    }

    pub fn remove_var(&mut self, key: &str) -> &mut Self {
        self.base_env.remove(key);
        self
    }

    pub fn remove_vars(&mut self, keys: &[&str]) -> &mut Self {
        for key in keys {
            self.base_env.remove(*key);
        }
        self
    }

    /// Prepend a directory to PATH
    pub fn add_to_path(&mut self, path: &Path) -> &mut Self {
        let current_path = self.base_env.get("PATH").cloned().unwrap_or_default();
        let new_path = if current_path.is_empty() {
            path.to_string_lossy().to_string()
        } else {
            format!(
                "{}{}{}",
                path.to_string_lossy(),
                path_separator(),
                current_path
            )
        };
        self.base_env.insert("PATH".to_string(), new_path);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.base_env.get(key).map(String::as_str)
    }

    pub fn build(&self) -> HashMap<String, String> {
        self.base_env.clone()
    }
}

pub fn path_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let invocation = ToolInvocation::new("npm")
            .arg("install")
            .with_args(["-g", "prettier"])
            .with_working_dir("/tmp/repo");

        assert_eq!(invocation.program, "npm");
        assert_eq!(invocation.args_lossy(), vec!["install", "-g", "prettier"]);
        assert_eq!(invocation.working_dir, Some(PathBuf::from("/tmp/repo")));
        assert!(invocation.environment.is_none());
        assert_eq!(invocation.to_string(), "npm install -g prettier");
    }

    #[test]
    fn test_process_environment_builder() {
        let mut env = ProcessEnvironment::new();
        env.set_var("TEST_VAR", "test_value")
            .add_to_path(Path::new("/usr/local/bin"))
            .add_to_path(Path::new("/env/bin"));

        let built = env.build();
        assert_eq!(built.get("TEST_VAR"), Some(&"test_value".to_string()));
        let path = built.get("PATH").unwrap();
        assert!(path.starts_with("/env/bin"));
        assert!(path.contains("/usr/local/bin"));
    }

    #[test]
    fn test_process_environment_remove_vars() {
        let mut env = ProcessEnvironment::new();
        env.set_var("PIP_USER", "1").set_var("KEEP", "yes");
        env.remove_vars(&["PIP_USER", "NOT_SET"]);

        assert!(env.get("PIP_USER").is_none());
        assert_eq!(env.get("KEEP"), Some("yes"));
    }

    #[test]
    fn test_combined_output() {
        let output = ToolOutput {
            exit_code: Some(1),
            stdout: b"resolving".to_vec(),
            stderr: b"error: not found\n".to_vec(),
        };
        assert!(!output.success());
        assert_eq!(output.combined_output(), "resolving\nerror: not found\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_captures_exit_code() {
        let runner = ProcessToolRunner::new();
        let output = runner
            .run(&ToolInvocation::new("sh").with_args(["-c", "echo out; exit 3"]))
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout().trim(), "out");
    }

    #[test]
    fn test_process_runner_spawn_failure() {
        let runner = ProcessToolRunner::new();
        let result = runner.run(&ToolInvocation::new("hookenv-definitely-missing-tool"));
        assert!(result.is_err());
        assert!(!runner.is_available("hookenv-definitely-missing-tool"));
    }
}
