//! Runner module - Execution abstraction layer
//!
//! This module runs a built testcase and reports what happened to the process:
//! - `LocalRunner`: runs the artifact directly, bounded by a wall-clock timeout
//!
//! The runner module does NOT:
//! - Decode exit codes or determine verdicts
//! - Compare outputs
//! - Know about languages or compilation

pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn with_path(self, path: &Path) -> Self {
        self.with_arg(path.to_string_lossy())
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }
}

/// Resource limits for execution
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock limit
    pub timeout: Duration,
}

impl RunLimits {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal
    Signaled(i32),
    /// Time limit exceeded; the process was killed
    TimeLimitExceeded,
}

/// Outcome of running a program
#[derive(Debug)]
pub struct RunOutcome {
    /// Execution status
    pub status: RunStatus,
    /// Wall-clock time until exit or kill
    pub elapsed: Duration,
    /// Stdout content
    pub stdout: String,
    /// Stderr content
    pub stderr: String,
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome>;
}

// Re-exports
pub use local::LocalRunner;
