//! Per-language build contract
//!
//! Every supported language satisfies the same four capabilities:
//! - `is_installed`: the toolchain can be invoked on this machine
//! - `precompile_submission`: student source -> intermediate artifact
//! - `precompile_testcase`: testcase source -> intermediate artifact
//! - `compile_testcase`: both intermediates -> runnable command
//!
//! Handlers only run compilers. Copying, deleting superseded sources and
//! removing partial artifacts on failure is done once, by the callers in
//! `submission` and `testcase`.

pub mod c_family;
pub mod python;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::compiler::CompilationError;
use crate::exit_codes::ExitCodeRegistry;
use crate::runner::CommandSpec;

/// Build steps of one language
#[async_trait]
pub trait TestcaseType: Send + Sync + fmt::Debug {
    /// Normalized name matched against `PROGRAMMING_LANGUAGE`
    fn name(&self) -> &'static str;

    /// Other accepted spellings of the name
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Suffix of source files, including the dot
    fn source_suffix(&self) -> &'static str;

    /// Suffix of precompiled intermediates
    fn artifact_suffix(&self) -> &'static str;

    /// Suffix of the runnable artifact
    fn executable_suffix(&self) -> &'static str;

    /// Whether the submission's file stem must match the configured source
    /// file name. Languages that import the submission by name need this.
    fn restricts_submission_name(&self) -> bool {
        true
    }

    async fn is_installed(&self) -> bool;

    /// Compile the copied submission source into an intermediate next to it
    async fn precompile_submission(
        &self,
        source: &Path,
        args: &[String],
    ) -> Result<PathBuf, CompilationError>;

    /// Compile a testcase source into an intermediate next to it
    async fn precompile_testcase(
        &self,
        source: &Path,
        exit_codes: &ExitCodeRegistry,
        args: &[String],
    ) -> Result<PathBuf, CompilationError>;

    /// Produce `executable` from both intermediates and return the command
    /// that runs it
    async fn compile_testcase(
        &self,
        testcase: &Path,
        precompiled_submission: &Path,
        executable: &Path,
        exit_codes: &ExitCodeRegistry,
        args: &[String],
    ) -> Result<CommandSpec, CompilationError>;
}

/// Path to `path` with its suffix swapped for `suffix` (".o")
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    path.with_extension(suffix.trim_start_matches('.'))
}

/// `true` when `program --version` runs and exits successfully
pub async fn tool_responds(program: &str) -> bool {
    tokio::process::Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix(Path::new("/tmp/a/t1.c"), ".o"), Path::new("/tmp/a/t1.o"));
        assert_eq!(with_suffix(Path::new("sub.py"), ".pyc"), Path::new("sub.pyc"));
    }

    #[tokio::test]
    async fn test_missing_tool_does_not_respond() {
        assert!(!tool_responds("definitely-not-a-real-compiler-xyz").await);
    }
}
