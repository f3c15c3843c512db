//! Local runner implementation
//!
//! Executes a built testcase directly, killing it when the timeout expires.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};

/// Human-readable signal name for logs
pub fn signal_name(signal: i32) -> &'static str {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str())
        .unwrap_or("UNKNOWN")
}

/// Runner that executes programs as plain child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command, bounded by `limits.timeout`
    pub async fn execute(
        &self,
        spec: &CommandSpec,
        limits: &RunLimits,
        stdin_content: Option<&str>,
    ) -> Result<RunOutcome> {
        debug!("Running {:?} with timeout {:?}", spec.to_vec(), limits.timeout);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(if stdin_content.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.work_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", spec.program))?;

        // Write stdin if provided
        if let Some(input) = stdin_content {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
            }
        }

        // Dropping the pending wait on timeout kills the child
        let output = match tokio::time::timeout(limits.timeout, child.wait_with_output()).await {
            Ok(output) => output.context("Failed to wait for program")?,
            Err(_) => {
                warn!("{} exceeded {:?}, killed", spec.program, limits.timeout);
                return Ok(RunOutcome {
                    status: RunStatus::TimeLimitExceeded,
                    elapsed: started.elapsed(),
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
        };

        let status = match (output.status.code(), output.status.signal()) {
            (Some(code), _) => RunStatus::Exited(code),
            (None, Some(signal)) => {
                debug!("{} killed by {}", spec.program, signal_name(signal));
                RunStatus::Signaled(signal)
            }
            (None, None) => anyhow::bail!("{} ended without exit code or signal", spec.program),
        };

        Ok(RunOutcome {
            status,
            elapsed: started.elapsed(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl Runner for LocalRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        self.execute(cmd, limits, stdin).await
    }
}
