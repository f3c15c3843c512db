//! Grader module for processing submissions
//!
//! A `GradingSession` owns everything that is shared across submissions:
//! - the resolved config and this run's exit code registry
//! - every testcase, precompiled once into a session-owned directory
//!
//! Each submission is then precompiled once in its own temporary directory
//! and linked against every testcase of its language. Testcases of one
//! submission run concurrently; dropping either directory removes every
//! artifact built in it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::arglists::{ArgListStage, ALL_TESTCASES};
use crate::config::{ConfigError, GradingConfig};
use crate::core::utils::outputs_match;
use crate::core::verdict::Verdict;
use crate::exit_codes::{ExitCodeEvent, ExitCodeRegistry};
use crate::runner::local::signal_name;
use crate::runner::{LocalRunner, RunLimits, RunStatus, Runner};
use crate::submission::{StemFormatChecker, Submission, SubmissionError, SubmissionFormatChecker};
use crate::testcase::TestCase;
use crate::testcase_types::TestcaseType;

/// Score a testcase reports for full marks
const FULL_SCORE: u8 = 100;

/// Session-level knobs that are not part of the grading config
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory holding `<testcase stem>.txt` expected outputs
    pub expected_output_dir: Option<PathBuf>,
    /// Testcases of one submission allowed to run at once
    pub max_parallel: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expected_output_dir: None,
            max_parallel: 4,
        }
    }
}

/// Result of one testcase for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestcaseResult {
    pub testcase: String,
    pub verdict: Verdict,
    /// 0-100, only for graded or output-checked testcases
    pub score: Option<u8>,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Build error / anomaly details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestcaseResult {
    fn new(testcase: &str, weight: f64, verdict: Verdict) -> Self {
        Self {
            testcase: testcase.to_string(),
            verdict,
            score: None,
            weight,
            exit_code: None,
            message: None,
        }
    }

    fn with_score(mut self, score: u8) -> Self {
        self.score = Some(score);
        self
    }

    fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of grading a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub submission: String,
    /// Weighted score scaled to `TOTAL_POINTS_POSSIBLE`
    pub score: f64,
    /// `TOTAL_POINTS_POSSIBLE` the score is scaled to
    pub points_possible: u32,
    pub testcase_results: Vec<TestcaseResult>,
    /// Why the submission could not be graded at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SubmissionResult {
    fn new(submission: String, testcase_results: Vec<TestcaseResult>, config: &GradingConfig) -> Self {
        let score = total_score(&testcase_results, config.total_score_to_100_ratio);
        Self {
            submission,
            score,
            points_possible: config.total_points_possible,
            testcase_results,
            error_message: None,
        }
    }

    fn ungradable(submission: String, message: String, config: &GradingConfig) -> Self {
        Self {
            submission,
            score: 0.0,
            points_possible: config.total_points_possible,
            testcase_results: vec![],
            error_message: Some(message),
        }
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &TestcaseResult> {
        self.testcase_results.iter().filter(|r| r.verdict.is_anomaly())
    }
}

/// Weighted average of testcase scores, scaled by `ratio`
pub fn total_score(results: &[TestcaseResult], ratio: f64) -> f64 {
    let total_weight: f64 = results.iter().map(|r| r.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = results
        .iter()
        .map(|r| f64::from(r.score.unwrap_or(0)) * r.weight)
        .sum();
    weighted / total_weight * ratio
}

/// A testcase after the session's precompilation pass
#[derive(Debug)]
enum PreparedTestcase {
    Ready(Arc<TestCase>),
    /// The instructor's testcase failed to build; every submission gets a
    /// compile error for it
    Broken {
        name: String,
        weight: f64,
        handler: &'static dyn TestcaseType,
        message: String,
    },
}

impl PreparedTestcase {
    fn handler(&self) -> &'static dyn TestcaseType {
        match self {
            PreparedTestcase::Ready(tc) => tc.handler(),
            PreparedTestcase::Broken { handler, .. } => *handler,
        }
    }
}

/// Shared state of one grading run
pub struct GradingSession {
    config: Arc<GradingConfig>,
    exit_codes: Arc<ExitCodeRegistry>,
    runner: Arc<dyn Runner>,
    format_checker: Arc<dyn SubmissionFormatChecker>,
    options: SessionOptions,
    testcases: Vec<PreparedTestcase>,
    // Holds the precompiled testcases; removed on drop
    _workspace: TempDir,
}

impl GradingSession {
    /// Start a session with a fresh exit code registry and the local runner
    pub async fn prepare(config: GradingConfig, options: SessionOptions) -> Result<Self> {
        let exit_codes = config.exit_code_registry();
        Self::prepare_with(config, exit_codes, Arc::new(LocalRunner::new()), options).await
    }

    /// Start a session with an explicit registry and runner
    pub async fn prepare_with(
        config: GradingConfig,
        exit_codes: ExitCodeRegistry,
        runner: Arc<dyn Runner>,
        options: SessionOptions,
    ) -> Result<Self> {
        for handler in config.testcase_types.values() {
            if !handler.is_installed().await {
                return Err(ConfigError::NotInstalled(handler.name()).into());
            }
        }

        let workspace = tempfile::tempdir().context("Failed to create testcase workspace")?;
        let exit_codes = Arc::new(exit_codes);

        let mut sources = Vec::new();
        let mut entries = tokio::fs::read_dir(&config.testcases_dir)
            .await
            .with_context(|| format!("Failed to read testcases from {:?}", config.testcases_dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() {
                if let Some(handler) = config.testcase_type_for(&path) {
                    sources.push((path, handler));
                }
            }
        }
        sources.sort_by(|a, b| a.0.cmp(&b.0));

        let mut testcases = Vec::with_capacity(sources.len());
        for (path, handler) in sources {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let copied = workspace.path().join(file_name);
            tokio::fs::copy(&path, &copied)
                .await
                .with_context(|| format!("Failed to copy testcase {:?}", path))?;

            let mut testcase = TestCase::from_config(copied, handler, &config);
            match testcase.precompile(&exit_codes).await {
                Ok(()) => testcases.push(PreparedTestcase::Ready(Arc::new(testcase))),
                Err(e) => {
                    warn!("Testcase {} failed to build: {}", testcase.name(), e);
                    testcases.push(PreparedTestcase::Broken {
                        name: testcase.name().to_string(),
                        weight: testcase.weight(),
                        handler,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Grading session ready: {} testcases ({} failed to build)",
            testcases.len(),
            testcases
                .iter()
                .filter(|t| matches!(t, PreparedTestcase::Broken { .. }))
                .count()
        );

        info!(
            "Expecting submissions named {}{}",
            config.source_file_name,
            if config.auto_source_file_name_enabled {
                " (default name, SOURCE_FILE_NAME is AUTO)"
            } else {
                ""
            }
        );
        let format_checker = Arc::new(StemFormatChecker {
            lower_source_filename: config.lower_source_filename,
        });

        Ok(Self {
            config: Arc::new(config),
            exit_codes,
            runner,
            format_checker,
            options,
            testcases,
            _workspace: workspace,
        })
    }

    pub fn exit_codes(&self) -> &ExitCodeRegistry {
        &self.exit_codes
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Names of every testcase in the session, in grading order
    pub fn testcase_names(&self) -> Vec<&str> {
        self.testcases
            .iter()
            .map(|t| match t {
                PreparedTestcase::Ready(tc) => tc.name(),
                PreparedTestcase::Broken { name, .. } => name.as_str(),
            })
            .collect()
    }

    /// Grade one submission against every testcase of its language
    pub async fn grade(&self, submission: &Submission) -> Result<SubmissionResult> {
        let name = submission.name();
        let Some(handler) = self.config.testcase_type_for(&submission.path) else {
            warn!("Submission {} has no testcases for its language", name);
            return Ok(SubmissionResult::ungradable(
                name,
                format!("No testcases for {:?}", submission.path),
                &self.config,
            ));
        };

        let relevant: Vec<&PreparedTestcase> = self
            .testcases
            .iter()
            .filter(|t| t.handler().source_suffix() == handler.source_suffix())
            .collect();

        let student_dir = tempfile::tempdir().context("Failed to create student directory")?;
        let args = self
            .config
            .argument_lists
            .lookup(ArgListStage::SubmissionPrecompilation, ALL_TESTCASES);

        let precompiled = submission
            .precompile(
                handler,
                student_dir.path(),
                &self.config.source_file_name,
                self.format_checker.as_ref(),
                &args,
            )
            .await;

        let precompiled = match precompiled {
            Ok(path) => path,
            Err(SubmissionError::Compilation(e)) => {
                info!("Submission {} failed to build: {}", name, e);
                let results = relevant
                    .iter()
                    .map(|t| {
                        let (testcase, weight) = match t {
                            PreparedTestcase::Ready(tc) => (tc.name(), tc.weight()),
                            PreparedTestcase::Broken { name, weight, .. } => (name.as_str(), *weight),
                        };
                        TestcaseResult::new(testcase, weight, Verdict::CompileError)
                            .with_message(e.to_string())
                    })
                    .collect();
                return Ok(SubmissionResult::new(name, results, &self.config));
            }
            Err(e) => {
                warn!("Submission {} cannot be graded: {}", name, e);
                return Ok(SubmissionResult::ungradable(name, e.to_string(), &self.config));
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let mut results: Vec<Option<TestcaseResult>> = vec![None; relevant.len()];
        let mut tasks = JoinSet::new();

        for (index, prepared) in relevant.iter().enumerate() {
            let testcase = match prepared {
                PreparedTestcase::Ready(tc) => Arc::clone(tc),
                PreparedTestcase::Broken {
                    name,
                    weight,
                    message,
                    ..
                } => {
                    results[index] = Some(
                        TestcaseResult::new(name, *weight, Verdict::CompileError)
                            .with_message(format!("Testcase failed to build: {}", message)),
                    );
                    continue;
                }
            };

            let semaphore = Arc::clone(&semaphore);
            let exit_codes = Arc::clone(&self.exit_codes);
            let runner = Arc::clone(&self.runner);
            let submission_artifact = precompiled.clone();
            let expected_output_dir = self.options.expected_output_dir.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = run_testcase(
                    &testcase,
                    &submission_artifact,
                    &exit_codes,
                    runner.as_ref(),
                    expected_output_dir.as_deref(),
                )
                .await;
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.context("Testcase task panicked")?;
            results[index] = Some(result);
        }

        let results: Vec<TestcaseResult> = results.into_iter().flatten().collect();
        let result = SubmissionResult::new(name, results, &self.config);
        info!(
            "Graded submission {}: score={:.2}, anomalies={}",
            result.submission,
            result.score,
            result.anomalies().count()
        );
        Ok(result)
    }
}

/// Link, run and decode a single testcase
async fn run_testcase(
    testcase: &TestCase,
    submission_artifact: &Path,
    exit_codes: &ExitCodeRegistry,
    runner: &dyn Runner,
    expected_output_dir: Option<&Path>,
) -> TestcaseResult {
    let name = testcase.name();
    let base = |verdict| TestcaseResult::new(name, testcase.weight(), verdict);

    let compiled = match testcase.compile(submission_artifact, exit_codes).await {
        Ok(compiled) => compiled,
        Err(e) => return base(Verdict::CompileError).with_message(e.to_string()),
    };

    debug!("Running testcase {} as {:?}", name, compiled.executable);
    let limits = RunLimits::new(testcase.timeout());
    let outcome = match runner.run(&compiled.command, &limits, None).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Failed to run testcase {}: {:#}", name, e);
            return base(Verdict::SystemError).with_message(format!("{:#}", e));
        }
    };
    debug!("Testcase {} finished in {:?}", name, outcome.elapsed);

    let code = match outcome.status {
        RunStatus::Exited(code) => code,
        RunStatus::TimeLimitExceeded => {
            return base(Verdict::TimeLimitExceeded)
                .with_message(format!("Exceeded {:?}", testcase.timeout()));
        }
        RunStatus::Signaled(signal) => {
            warn!("Testcase {} killed by {}", name, signal_name(signal));
            return base(Verdict::SystemError)
                .with_message(format!("Killed by {}", signal_name(signal)));
        }
    };

    let decoded = match exit_codes.scan(code) {
        Ok(decoded) => decoded,
        Err(e) => return base(Verdict::SystemError).with_exit_code(code).with_message(e.to_string()),
    };

    match decoded.event() {
        ExitCodeEvent::Result => base(Verdict::Graded)
            .with_score(decoded.expect_value())
            .with_exit_code(code),
        ExitCodeEvent::CheckOutput => {
            check_output(base, testcase.stem(), &outcome.stdout, expected_output_dir)
                .await
                .with_exit_code(code)
        }
        ExitCodeEvent::SystemError => {
            warn!("Testcase {} exited with reserved code {}", name, code);
            base(Verdict::SystemError)
                .with_exit_code(code)
                .with_message(outcome.stderr.trim().to_string())
        }
        ExitCodeEvent::CheatAttempt => {
            warn!("Testcase {} exited with unassigned code {}", name, code);
            base(Verdict::CheatAttempt)
                .with_exit_code(code)
                .with_message("Exit code was not assigned in this grading run")
        }
    }
}

/// Compare stdout against `<expected_output_dir>/<stem>.txt`
async fn check_output(
    base: impl Fn(Verdict) -> TestcaseResult,
    stem: &str,
    stdout: &str,
    expected_output_dir: Option<&Path>,
) -> TestcaseResult {
    let Some(dir) = expected_output_dir else {
        return base(Verdict::SystemError)
            .with_message("Output check requested but no expected output directory is set");
    };

    let expected_path = dir.join(format!("{}.txt", stem));
    match tokio::fs::read_to_string(&expected_path).await {
        Ok(expected) if outputs_match(stdout, &expected) => {
            base(Verdict::OutputMatched).with_score(FULL_SCORE)
        }
        Ok(_) => base(Verdict::OutputMismatched).with_score(0),
        Err(e) => base(Verdict::SystemError)
            .with_message(format!("Failed to read expected output {:?}: {}", expected_path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{run_compiler, CompilationError};
    use crate::runner::{CommandSpec, RunOutcome};
    use crate::testcase_types::c_family::CFamily;
    use crate::testcase_types::with_suffix;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;

    /// Shell scripts: `sh -n` is the compiler, copying is the linker
    #[derive(Debug)]
    struct Script;

    static SCRIPT: Script = Script;

    impl Script {
        async fn check_and_copy(&self, source: &Path, target: &Path) -> Result<(), CompilationError> {
            run_compiler(&CommandSpec::new("sh").with_arg("-n").with_path(source)).await?;
            tokio::fs::copy(source, target)
                .await
                .map_err(|e| CompilationError::io("copy", source, e))?;
            Ok(())
        }
    }

    #[async_trait]
    impl TestcaseType for Script {
        fn name(&self) -> &'static str {
            "script"
        }

        fn source_suffix(&self) -> &'static str {
            ".sh"
        }

        fn artifact_suffix(&self) -> &'static str {
            ".art"
        }

        fn executable_suffix(&self) -> &'static str {
            ".run"
        }

        fn restricts_submission_name(&self) -> bool {
            false
        }

        async fn is_installed(&self) -> bool {
            true
        }

        async fn precompile_submission(
            &self,
            source: &Path,
            _args: &[String],
        ) -> Result<PathBuf, CompilationError> {
            let artifact = with_suffix(source, self.artifact_suffix());
            self.check_and_copy(source, &artifact).await?;
            Ok(artifact)
        }

        async fn precompile_testcase(
            &self,
            source: &Path,
            _exit_codes: &ExitCodeRegistry,
            _args: &[String],
        ) -> Result<PathBuf, CompilationError> {
            self.precompile_submission(source, &[]).await
        }

        async fn compile_testcase(
            &self,
            testcase: &Path,
            _precompiled_submission: &Path,
            executable: &Path,
            _exit_codes: &ExitCodeRegistry,
            _args: &[String],
        ) -> Result<CommandSpec, CompilationError> {
            tokio::fs::copy(testcase, executable)
                .await
                .map_err(|e| CompilationError::io("copy", testcase, e))?;
            Ok(CommandSpec::new("sh").with_path(executable))
        }
    }

    /// Runner whose every launch fails
    struct BrokenRunner;

    #[async_trait]
    impl Runner for BrokenRunner {
        async fn run(
            &self,
            _cmd: &CommandSpec,
            _limits: &RunLimits,
            _stdin: Option<&str>,
        ) -> Result<RunOutcome> {
            anyhow::bail!("sandbox unavailable")
        }
    }

    const CONFIG: &str = r#"
TIMEOUT = "slow.sh:0.3, ALL:10"
GENERATE_RESULTS = false
ANTI_CHEAT = false
TOTAL_POINTS_POSSIBLE = 50
PROGRAMMING_LANGUAGE = "c"
ASSIGNMENT_NAME = "hw1"
SOURCE_FILE_NAME = "AUTO"
LOWER_SOURCE_FILENAME = true
TESTCASE_WEIGHTS = "full.sh:3, ALL:1"
"#;

    struct Fixture {
        testcases: tempfile::TempDir,
        expected: tempfile::TempDir,
        submissions: tempfile::TempDir,
        registry: ExitCodeRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                testcases: tempfile::tempdir().unwrap(),
                expected: tempfile::tempdir().unwrap(),
                submissions: tempfile::tempdir().unwrap(),
                registry: ExitCodeRegistry::unshuffled(),
            }
        }

        fn testcase(&self, name: &str, body: &str) {
            fs::write(self.testcases.path().join(name), body).unwrap();
        }

        fn submission(&self, name: &str, body: &str) -> Submission {
            let path = self.submissions.path().join(name);
            fs::write(&path, body).unwrap();
            Submission::new(path)
        }

        fn result_code(&self, value: u8) -> u8 {
            self.registry.result_codes()[usize::from(value)]
        }

        async fn session(&self, runner: Arc<dyn Runner>) -> GradingSession {
            let table: toml::Table = toml::from_str(CONFIG).unwrap();
            let mut config = GradingConfig::from_table(self.testcases.path(), table).unwrap();
            config.testcase_types = BTreeMap::from([(".sh", &SCRIPT as &'static dyn TestcaseType)]);

            let options = SessionOptions {
                expected_output_dir: Some(self.expected.path().to_path_buf()),
                max_parallel: 2,
            };
            GradingSession::prepare_with(config, self.registry.clone(), runner, options)
                .await
                .unwrap()
        }
    }

    fn by_name(result: &SubmissionResult) -> BTreeMap<&str, &TestcaseResult> {
        result
            .testcase_results
            .iter()
            .map(|r| (r.testcase.as_str(), r))
            .collect()
    }

    #[test]
    fn test_total_score_weighted() {
        let results = vec![
            TestcaseResult::new("a", 3.0, Verdict::Graded).with_score(100),
            TestcaseResult::new("b", 1.0, Verdict::Graded).with_score(20),
            TestcaseResult::new("c", 0.0, Verdict::Graded).with_score(0),
        ];
        assert!((total_score(&results, 1.0) - 80.0).abs() < 1e-9);
        assert!((total_score(&results, 0.5) - 40.0).abs() < 1e-9);
        assert_eq!(total_score(&[], 1.0), 0.0);
    }

    #[tokio::test]
    async fn test_every_verdict_path() {
        let fx = Fixture::new();
        fx.testcase("full.sh", &format!("exit {}\n", fx.result_code(100)));
        fx.testcase("half.sh", &format!("exit {}\n", fx.result_code(50)));
        fx.testcase(
            "out.sh",
            &format!("echo hello\nexit {}\n", fx.registry.check_output_code()),
        );
        fx.testcase(
            "wrong.sh",
            &format!("echo goodbye\nexit {}\n", fx.registry.check_output_code()),
        );
        fx.testcase("reserved.sh", "echo boom >&2\nexit 2\n");
        // Usable, but beyond the codes an unshuffled run hands out
        fx.testcase("cheat.sh", "exit 250\n");
        fx.testcase("killed.sh", "kill -9 $$\n");
        fx.testcase("slow.sh", "sleep 5\n");
        fx.testcase("broken.sh", "if then fi (\n");
        fx.testcase("notes.md", "ignored\n");
        fs::write(fx.expected.path().join("out.txt"), "hello\r\n\n").unwrap();
        fs::write(fx.expected.path().join("wrong.txt"), "hello\n").unwrap();

        let session = fx.session(Arc::new(LocalRunner::new())).await;
        assert_eq!(session.testcase_names().len(), 9);

        let result = session
            .grade(&fx.submission("Homework.sh", "true\n"))
            .await
            .unwrap();
        let results = by_name(&result);

        assert_eq!(results["full.sh"].verdict, Verdict::Graded);
        assert_eq!(results["full.sh"].score, Some(100));
        assert_eq!(results["full.sh"].weight, 3.0);
        assert_eq!(results["half.sh"].score, Some(50));
        assert_eq!(results["out.sh"].verdict, Verdict::OutputMatched);
        assert_eq!(results["out.sh"].score, Some(100));
        assert_eq!(results["wrong.sh"].verdict, Verdict::OutputMismatched);
        assert_eq!(results["wrong.sh"].score, Some(0));
        assert_eq!(results["reserved.sh"].verdict, Verdict::SystemError);
        assert_eq!(results["reserved.sh"].exit_code, Some(2));
        assert_eq!(results["reserved.sh"].message.as_deref(), Some("boom"));
        assert_eq!(results["cheat.sh"].verdict, Verdict::CheatAttempt);
        assert_eq!(results["cheat.sh"].exit_code, Some(250));
        assert_eq!(results["cheat.sh"].score, None);
        assert_eq!(results["killed.sh"].verdict, Verdict::SystemError);
        assert_eq!(results["slow.sh"].verdict, Verdict::TimeLimitExceeded);
        assert_eq!(results["broken.sh"].verdict, Verdict::CompileError);
        assert_eq!(result.anomalies().count(), 3);

        // (100*3 + 50 + 100) / 11 weights, scaled to 50 points
        let expected = (300.0 + 50.0 + 100.0) / 11.0 * 0.5;
        assert!((result.score - expected).abs() < 1e-9);
        assert_eq!(result.points_possible, 50);
    }

    #[tokio::test]
    async fn test_submission_compile_error_fails_every_testcase() {
        let fx = Fixture::new();
        fx.testcase("a.sh", &format!("exit {}\n", fx.result_code(100)));
        fx.testcase("b.sh", &format!("exit {}\n", fx.result_code(100)));

        let session = fx.session(Arc::new(LocalRunner::new())).await;
        let result = session
            .grade(&fx.submission("homework.sh", "if then fi (\n"))
            .await
            .unwrap();

        assert_eq!(result.testcase_results.len(), 2);
        assert!(result
            .testcase_results
            .iter()
            .all(|r| r.verdict == Verdict::CompileError && r.message.is_some()));
        assert_eq!(result.score, 0.0);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_submission_of_other_language_is_ungradable() {
        let fx = Fixture::new();
        fx.testcase("a.sh", "exit 0\n");

        let session = fx.session(Arc::new(LocalRunner::new())).await;
        let result = session
            .grade(&fx.submission("homework.py", "print(1)\n"))
            .await
            .unwrap();

        assert!(result.testcase_results.is_empty());
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn test_runner_failure_is_system_error() {
        let fx = Fixture::new();
        fx.testcase("a.sh", &format!("exit {}\n", fx.result_code(100)));

        let session = fx.session(Arc::new(BrokenRunner)).await;
        let result = session
            .grade(&fx.submission("homework.sh", "true\n"))
            .await
            .unwrap();

        assert_eq!(result.testcase_results[0].verdict, Verdict::SystemError);
        assert!(result.testcase_results[0]
            .message
            .as_deref()
            .unwrap()
            .contains("sandbox unavailable"));
    }

    #[tokio::test]
    async fn test_submissions_share_precompiled_testcases() {
        let fx = Fixture::new();
        fx.testcase("a.sh", &format!("exit {}\n", fx.result_code(70)));

        let session = fx.session(Arc::new(LocalRunner::new())).await;
        for name in ["alice.sh", "bob.sh"] {
            let result = session.grade(&fx.submission(name, "true\n")).await.unwrap();
            assert_eq!(result.testcase_results[0].score, Some(70));
        }
        // Instructor files are never touched
        assert!(fx.testcases.path().join("a.sh").exists());
    }

    #[tokio::test]
    async fn test_missing_toolchain_fails_session_start() {
        static MISSING: CFamily = CFamily::new("missing", &[], "no-such-compiler-xyz", ".c");

        let fx = Fixture::new();
        fx.testcase("a.c", "int main(void) { return 0; }\n");
        let table: toml::Table = toml::from_str(CONFIG).unwrap();
        let mut config = GradingConfig::from_table(fx.testcases.path(), table).unwrap();
        config.testcase_types = BTreeMap::from([(".c", &MISSING as &'static dyn TestcaseType)]);

        let err = GradingSession::prepare_with(
            config,
            ExitCodeRegistry::unshuffled(),
            Arc::new(LocalRunner::new()),
            SessionOptions::default(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotInstalled("missing"))
        ));
    }

    #[tokio::test]
    async fn test_gcc_end_to_end() {
        if !crate::testcase_types::c_family::C.is_installed().await {
            return;
        }
        let testcases = tempfile::tempdir().unwrap();
        let submissions = tempfile::tempdir().unwrap();
        fs::write(
            testcases.path().join("add.c"),
            "static const int codes[] = {RESULT_EXIT_CODES};\n\
             int add(int, int);\n\
             int main(void) { return add(2, 2) == 4 ? codes[100] : codes[0]; }\n",
        )
        .unwrap();
        let submission = submissions.path().join("whatever.c");
        fs::write(&submission, "int add(int a, int b) { return a + b; }\nint main(void) { return 0; }\n").unwrap();

        let table: toml::Table = toml::from_str(&CONFIG.replace("\"c\"", "\"AUTO\"")).unwrap();
        let config = GradingConfig::from_table(testcases.path(), table).unwrap();
        let session = GradingSession::prepare(config, SessionOptions::default())
            .await
            .unwrap();
        let result = session.grade(&Submission::new(submission)).await.unwrap();

        assert_eq!(result.testcase_results[0].verdict, Verdict::Graded);
        assert_eq!(result.testcase_results[0].score, Some(100));
        assert!((result.score - 50.0).abs() < 1e-9);
    }
}
