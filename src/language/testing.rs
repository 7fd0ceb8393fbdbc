// Scripted ToolRunner for language backend unit tests

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{ProcessError, Result};
use crate::process::{ToolInvocation, ToolOutput, ToolRunner};

type Responder = Box<dyn Fn(&ToolInvocation) -> Option<ToolOutput> + Send + Sync>;

/// Records every invocation. Programs listed as available resolve to
/// `<tool dir>/<name>` (`/usr/bin` unless changed); runs succeed with empty output
/// unless a responder says otherwise.
pub struct FakeRunner {
    available: HashSet<String>,
    tool_dir: PathBuf,
    invocations: Mutex<Vec<ToolInvocation>>,
    responder: Option<Responder>,
}

impl FakeRunner {
    pub fn with_tools(tools: &[&str]) -> Self {
        Self {
            available: tools.iter().map(|t| t.to_string()).collect(),
            tool_dir: PathBuf::from("/usr/bin"),
            invocations: Mutex::new(Vec::new()),
            responder: None,
        }
    }

    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = dir.into();
        self
    }

    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ToolInvocation) -> Option<ToolOutput> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().clone()
    }

    /// Each invocation rendered as `program arg arg ...`
    pub fn commands(&self) -> Vec<String> {
        self.invocations().iter().map(|i| i.to_string()).collect()
    }
}

pub fn succeed_with(stdout: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

pub fn fail_with(stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

impl ToolRunner for FakeRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.invocations.lock().push(invocation.clone());
        if let Some(output) = self.responder.as_ref().and_then(|r| r(invocation)) {
            return Ok(output);
        }
        let program = invocation.program.rsplit(['/', '\\']).next().unwrap_or("");
        if invocation.program.contains(['/', '\\']) || self.available.contains(program) {
            Ok(succeed_with(""))
        } else {
            Err(ProcessError::SpawnFailed {
                command: invocation.to_string(),
                error: "No such file or directory".to_string(),
            }
            .into())
        }
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        self.available
            .contains(name)
            .then(|| self.tool_dir.join(name))
    }
}
