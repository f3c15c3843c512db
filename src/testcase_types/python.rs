//! Python testcases
//!
//! Sources are byte-compiled with `py_compile`, which both validates syntax up
//! front and lets the interpreter load the `.pyc` without the source. The
//! testcase imports the submission as a module named after the configured
//! source file name, so the submission keeps that stem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{tool_responds, with_suffix, TestcaseType};
use crate::compiler::{run_compiler, CompilationError};
use crate::exit_codes::ExitCodeRegistry;
use crate::runner::CommandSpec;

pub static PYTHON: Python = Python::new("python3");

const PY_COMPILE: &str =
    "import py_compile, sys; py_compile.compile(sys.argv[1], cfile=sys.argv[2], doraise=True)";

#[derive(Debug)]
pub struct Python {
    interpreter: &'static str,
}

impl Python {
    pub const fn new(interpreter: &'static str) -> Self {
        Self { interpreter }
    }

    async fn byte_compile(&self, source: &Path, args: &[String]) -> Result<PathBuf, CompilationError> {
        let compiled = with_suffix(source, self.artifact_suffix());
        let cmd = CommandSpec::new(self.interpreter)
            .with_args(args.iter().cloned())
            .with_args(["-c", PY_COMPILE])
            .with_path(source)
            .with_path(&compiled);

        run_compiler(&cmd).await?;
        Ok(compiled)
    }
}

#[async_trait]
impl TestcaseType for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["py", "python3"]
    }

    fn source_suffix(&self) -> &'static str {
        ".py"
    }

    fn artifact_suffix(&self) -> &'static str {
        ".pyc"
    }

    // Must differ from the artifact suffix: a testcase named after the
    // submission would otherwise overwrite the student's module
    fn executable_suffix(&self) -> &'static str {
        ".test.pyc"
    }

    async fn is_installed(&self) -> bool {
        tool_responds(self.interpreter).await
    }

    async fn precompile_submission(
        &self,
        source: &Path,
        args: &[String],
    ) -> Result<PathBuf, CompilationError> {
        self.byte_compile(source, args).await
    }

    async fn precompile_testcase(
        &self,
        source: &Path,
        _exit_codes: &ExitCodeRegistry,
        args: &[String],
    ) -> Result<PathBuf, CompilationError> {
        self.byte_compile(source, args).await
    }

    /// Nothing is linked: the testcase is copied next to the submission, so
    /// a student program cannot tamper with the shared precompiled copy.
    async fn compile_testcase(
        &self,
        testcase: &Path,
        precompiled_submission: &Path,
        executable: &Path,
        exit_codes: &ExitCodeRegistry,
        args: &[String],
    ) -> Result<CommandSpec, CompilationError> {
        tokio::fs::copy(testcase, executable)
            .await
            .map_err(|e| CompilationError::io("copy", testcase, e))?;

        let work_dir = precompiled_submission.parent().unwrap_or(Path::new("."));
        let mut cmd = CommandSpec::new(self.interpreter)
            .with_args(args.iter().cloned())
            .with_path(executable)
            .with_env("PYTHONPATH", work_dir.to_string_lossy())
            .with_env("PYTHONDONTWRITEBYTECODE", "1")
            .with_work_dir(work_dir);
        for (name, value) in exit_codes.formatted() {
            cmd = cmd.with_env(name, value);
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{LocalRunner, RunLimits, RunStatus};
    use std::fs;

    const TESTCASE: &str = r#"
import os, sys
import homework
codes = [int(c) for c in os.environ["RESULT_EXIT_CODES"].split(",")]
sys.exit(codes[40] if homework.double(21) == 42 else codes[0])
"#;

    #[tokio::test]
    async fn test_python_full_build_and_run() {
        if !PYTHON.is_installed().await {
            return;
        }
        let registry = ExitCodeRegistry::generate();
        let shared = tempfile::tempdir().unwrap();
        let student = tempfile::tempdir().unwrap();

        let submission = student.path().join("homework.py");
        fs::write(&submission, "def double(x):\n    return x * 2\n").unwrap();
        let testcase = shared.path().join("t.py");
        fs::write(&testcase, TESTCASE).unwrap();

        let sub_pyc = PYTHON.precompile_submission(&submission, &[]).await.unwrap();
        assert_eq!(sub_pyc, student.path().join("homework.pyc"));
        // Sourceless import only works once the .py is gone
        fs::remove_file(&submission).unwrap();

        let test_pyc = PYTHON.precompile_testcase(&testcase, &registry, &[]).await.unwrap();
        let exe = student.path().join("t.test.pyc");
        let cmd = PYTHON
            .compile_testcase(&test_pyc, &sub_pyc, &exe, &registry, &[])
            .await
            .unwrap();

        let outcome = LocalRunner
            .execute(&cmd, &RunLimits::default(), None)
            .await
            .unwrap();
        let RunStatus::Exited(code) = outcome.status else {
            panic!("unexpected status {:?}: {}", outcome.status, outcome.stderr);
        };
        assert_eq!(registry.scan(code).unwrap().value(), Some(40));
    }

    #[tokio::test]
    async fn test_testcase_named_like_submission_keeps_submission() {
        if !PYTHON.is_installed().await {
            return;
        }
        let registry = ExitCodeRegistry::unshuffled();
        let shared = tempfile::tempdir().unwrap();
        let student = tempfile::tempdir().unwrap();

        let submission = student.path().join("homework.py");
        fs::write(&submission, "def double(x):\n    return x * 2\n").unwrap();
        let testcase = shared.path().join("homework.py");
        fs::write(&testcase, TESTCASE).unwrap();

        let sub_pyc = PYTHON.precompile_submission(&submission, &[]).await.unwrap();
        fs::remove_file(&submission).unwrap();
        let test_pyc = PYTHON.precompile_testcase(&testcase, &registry, &[]).await.unwrap();

        let exe = student.path().join(format!("homework{}", PYTHON.executable_suffix()));
        assert_ne!(exe, sub_pyc);
        let cmd = PYTHON
            .compile_testcase(&test_pyc, &sub_pyc, &exe, &registry, &[])
            .await
            .unwrap();

        let outcome = LocalRunner
            .execute(&cmd, &RunLimits::default(), None)
            .await
            .unwrap();
        let RunStatus::Exited(code) = outcome.status else {
            panic!("unexpected status {:?}: {}", outcome.status, outcome.stderr);
        };
        assert_eq!(registry.scan(code).unwrap().value(), Some(40));
    }

    #[tokio::test]
    async fn test_python_syntax_error() {
        if !PYTHON.is_installed().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("homework.py");
        fs::write(&source, "def broken(:\n").unwrap();

        let err = PYTHON.precompile_submission(&source, &[]).await.unwrap_err();
        assert!(matches!(err, CompilationError::Failed { .. }));
        assert!(!dir.path().join("homework.pyc").exists());
    }
}
