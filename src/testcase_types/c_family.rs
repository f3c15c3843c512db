//! C and C++ testcases built with gcc / g++
//!
//! The submission is compiled with its `main` renamed to `__student_main__`,
//! so the testcase owns the program entry point and decides when, and how
//! often, to call into student code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{tool_responds, with_suffix, TestcaseType};
use crate::compiler::{run_compiler, CompilationError};
use crate::exit_codes::ExitCodeRegistry;
use crate::runner::CommandSpec;

/// Flags every C/C++ submission is compiled with
const SUBMISSION_COMPILATION_ARGS: &[&str] = &["-Dscanf_s=scanf", "-Dmain=__student_main__"];

pub static C: CFamily = CFamily::new("c", &["gcc"], "gcc", ".c");
pub static CPP: CFamily = CFamily::new("c++", &["cpp", "cxx", "g++"], "g++", ".cpp");

/// A gcc-style compiler driver
#[derive(Debug)]
pub struct CFamily {
    name: &'static str,
    aliases: &'static [&'static str],
    compiler: &'static str,
    source_suffix: &'static str,
}

impl CFamily {
    pub const fn new(
        name: &'static str,
        aliases: &'static [&'static str],
        compiler: &'static str,
        source_suffix: &'static str,
    ) -> Self {
        Self {
            name,
            aliases,
            compiler,
            source_suffix,
        }
    }

    /// Exit code table as preprocessor definitions
    fn exit_code_definitions(exit_codes: &ExitCodeRegistry) -> Vec<String> {
        exit_codes
            .formatted()
            .into_iter()
            .map(|(name, value)| format!("-D{}={}", name, value))
            .collect()
    }
}

#[async_trait]
impl TestcaseType for CFamily {
    fn name(&self) -> &'static str {
        self.name
    }

    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn source_suffix(&self) -> &'static str {
        self.source_suffix
    }

    fn artifact_suffix(&self) -> &'static str {
        ".o"
    }

    fn executable_suffix(&self) -> &'static str {
        ".out"
    }

    // main is renamed away, so the file name is irrelevant
    fn restricts_submission_name(&self) -> bool {
        false
    }

    async fn is_installed(&self) -> bool {
        tool_responds(self.compiler).await
    }

    async fn precompile_submission(
        &self,
        source: &Path,
        args: &[String],
    ) -> Result<PathBuf, CompilationError> {
        let object = with_suffix(source, self.artifact_suffix());
        let cmd = CommandSpec::new(self.compiler)
            .with_arg("-c")
            .with_path(source)
            .with_arg("-o")
            .with_path(&object)
            .with_args(SUBMISSION_COMPILATION_ARGS.iter().copied())
            .with_args(args.iter().cloned());

        run_compiler(&cmd).await?;
        Ok(object)
    }

    async fn precompile_testcase(
        &self,
        source: &Path,
        exit_codes: &ExitCodeRegistry,
        args: &[String],
    ) -> Result<PathBuf, CompilationError> {
        let object = with_suffix(source, self.artifact_suffix());
        let cmd = CommandSpec::new(self.compiler)
            .with_arg("-c")
            .with_path(source)
            .with_arg("-o")
            .with_path(&object)
            .with_args(Self::exit_code_definitions(exit_codes))
            .with_args(args.iter().cloned());

        run_compiler(&cmd).await?;
        Ok(object)
    }

    async fn compile_testcase(
        &self,
        testcase: &Path,
        precompiled_submission: &Path,
        executable: &Path,
        _exit_codes: &ExitCodeRegistry,
        args: &[String],
    ) -> Result<CommandSpec, CompilationError> {
        let cmd = CommandSpec::new(self.compiler)
            .with_arg("-o")
            .with_path(executable)
            .with_path(testcase)
            .with_path(precompiled_submission)
            .with_args(args.iter().cloned());

        run_compiler(&cmd).await?;

        let work_dir = executable.parent().unwrap_or(Path::new("."));
        Ok(CommandSpec::new(executable.to_string_lossy()).with_work_dir(work_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    const TESTCASE: &str = r#"
#include <stdio.h>
int __student_main__(void);
int add(int a, int b);
static const int result_codes[] = {RESULT_EXIT_CODES};
int main(void) {
    return add(2, 3) == 5 ? result_codes[100] : result_codes[0];
}
"#;

    const SUBMISSION: &str = r#"
int add(int a, int b) { return a + b; }
int main(void) { return 0; }
"#;

    #[test]
    fn test_exit_code_definitions() {
        let registry = ExitCodeRegistry::unshuffled();
        let defs = CFamily::exit_code_definitions(&registry);
        assert_eq!(defs.len(), 2);
        assert_eq!(
            defs[0],
            format!("-DCHECK_OUTPUT_EXIT_CODE={}", registry.check_output_code())
        );
        assert!(defs[1].starts_with("-DRESULT_EXIT_CODES=0,3,4,"));
    }

    #[tokio::test]
    async fn test_gcc_full_build() {
        if !C.is_installed().await {
            return;
        }
        let registry = ExitCodeRegistry::generate_with_rng(&mut StdRng::seed_from_u64(1));
        let dir = tempfile::tempdir().unwrap();
        let submission = dir.path().join("homework.c");
        let testcase = dir.path().join("t.c");
        fs::write(&submission, SUBMISSION).unwrap();
        fs::write(&testcase, TESTCASE).unwrap();

        let sub_obj = C.precompile_submission(&submission, &[]).await.unwrap();
        let test_obj = C.precompile_testcase(&testcase, &registry, &[]).await.unwrap();
        assert_eq!(sub_obj, dir.path().join("homework.o"));
        assert_eq!(test_obj, dir.path().join("t.o"));

        let exe = dir.path().join("t.out");
        let cmd = C
            .compile_testcase(&test_obj, &sub_obj, &exe, &registry, &[])
            .await
            .unwrap();
        assert!(exe.exists());

        let status = std::process::Command::new(&cmd.program).status().unwrap();
        let decoded = registry.scan(status.code().unwrap()).unwrap();
        assert_eq!(decoded.value(), Some(100));
    }

    #[tokio::test]
    async fn test_syntax_error_fails() {
        if !C.is_installed().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let submission = dir.path().join("homework.c");
        fs::write(&submission, "int main( {").unwrap();

        let err = C.precompile_submission(&submission, &[]).await.unwrap_err();
        assert!(matches!(err, CompilationError::Failed { .. }));
    }
}
