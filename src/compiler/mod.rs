//! Compiler module - External toolchain invocation
//!
//! Every build step of every language ends up here: one external command,
//! run to completion under a fixed timeout. A non-zero exit is a
//! `CompilationError`, which fails the affected testcase only.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::runner::CommandSpec;

/// Upper bound for a single compiler invocation
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Compiler output kept in error messages
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// A build step that did not produce its artifact
#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("Failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}): {diagnostics}")]
    Failed {
        program: String,
        status: String,
        diagnostics: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("Failed to {action} {path:?}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Testcase {0} has not been precompiled")]
    NotPrecompiled(String),
}

impl CompilationError {
    pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        CompilationError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Run a compiler command and wait for it to succeed
pub async fn run_compiler(spec: &CommandSpec) -> Result<(), CompilationError> {
    debug!("Compiling with command: {:?}", spec.to_vec());

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.work_dir {
        cmd.current_dir(dir);
    }

    let output = tokio::time::timeout(COMPILE_TIMEOUT, cmd.output())
        .await
        .map_err(|_| CompilationError::TimedOut {
            program: spec.program.clone(),
            timeout: COMPILE_TIMEOUT,
        })?
        .map_err(|source| CompilationError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let diagnostics = if !stderr.trim().is_empty() {
        truncate(stderr.trim())
    } else {
        truncate(stdout.trim())
    };
    let status = match output.status.code() {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    };

    warn!("{} failed ({})", spec.program, status);
    Err(CompilationError::Failed {
        program: spec.program.clone(),
        status,
        diagnostics,
    })
}

/// Remove a file if it exists
pub async fn remove_if_exists(path: &Path) -> Result<(), CompilationError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CompilationError::io("remove", path, e)),
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text.to_string();
    }
    let mut end = MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
