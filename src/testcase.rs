//! Instructor testcases
//!
//! A testcase moves through explicit states:
//! - `Source`: the instructor's source file
//! - `Precompiled`: an intermediate artifact; the source is gone
//!
//! Linking against a precompiled submission does not change the testcase; it
//! yields a separate [`CompiledTestcase`] owned by that submission's run, so one
//! precompiled testcase serves every submission.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::arglists::{ArgListStage, ResolvedArgLists};
use crate::compiler::{remove_if_exists, CompilationError};
use crate::config::GradingConfig;
use crate::exit_codes::ExitCodeRegistry;
use crate::runner::CommandSpec;
use crate::testcase_types::TestcaseType;

/// Which file currently represents the testcase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    Source(PathBuf),
    Precompiled(PathBuf),
}

impl ArtifactState {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactState::Source(path) | ArtifactState::Precompiled(path) => path,
        }
    }
}

/// A testcase linked against one submission, ready to run
#[derive(Debug, Clone)]
pub struct CompiledTestcase {
    pub executable: PathBuf,
    pub command: CommandSpec,
}

#[derive(Debug)]
pub struct TestCase {
    /// Original file name, the key for per-testcase config entries
    name: String,
    handler: &'static dyn TestcaseType,
    arg_lists: ResolvedArgLists,
    timeout: Duration,
    weight: f64,
    state: ArtifactState,
}

impl TestCase {
    pub fn new(
        source: PathBuf,
        handler: &'static dyn TestcaseType,
        arg_lists: ResolvedArgLists,
        timeout: Duration,
        weight: f64,
    ) -> Self {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            handler,
            arg_lists,
            timeout,
            weight,
            state: ArtifactState::Source(source),
        }
    }

    /// Testcase with timeout, weight and argument lists resolved from config
    pub fn from_config(
        source: PathBuf,
        handler: &'static dyn TestcaseType,
        config: &GradingConfig,
    ) -> Self {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(
            source,
            handler,
            config.arglists_for(&name),
            config.timeout_for(&name),
            config.weight_for(&name),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    pub fn handler(&self) -> &'static dyn TestcaseType {
        self.handler
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn path(&self) -> &Path {
        self.state.path()
    }

    /// Replace the source with its intermediate artifact.
    ///
    /// On failure the state stays `Source`, the source file is kept and any
    /// partial artifact is removed, so a retry starts clean.
    pub async fn precompile(&mut self, exit_codes: &ExitCodeRegistry) -> Result<(), CompilationError> {
        let source = match &self.state {
            ArtifactState::Source(source) => source.clone(),
            ArtifactState::Precompiled(_) => {
                debug!("Testcase {} is already precompiled at {:?}", self.name, self.path());
                return Ok(());
            }
        };

        let args = self.arg_lists.get(ArgListStage::TestcasePrecompilation);
        match self.handler.precompile_testcase(&source, exit_codes, args).await {
            Ok(artifact) => {
                remove_if_exists(&source).await?;
                info!("Precompiled testcase {} -> {:?}", self.name, artifact);
                self.state = ArtifactState::Precompiled(artifact);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to precompile testcase {}: {}", self.name, e);
                let partial = source.with_extension(
                    self.handler.artifact_suffix().trim_start_matches('.'),
                );
                if partial != source {
                    remove_if_exists(&partial).await?;
                }
                Err(e)
            }
        }
    }

    /// Runnable artifact path, next to the submission and named after the testcase
    pub fn make_executable_path(&self, precompiled_submission: &Path) -> PathBuf {
        precompiled_submission.with_file_name(format!(
            "{}{}",
            self.stem(),
            self.handler.executable_suffix()
        ))
    }

    /// Link the precompiled testcase with a precompiled submission
    pub async fn compile(
        &self,
        precompiled_submission: &Path,
        exit_codes: &ExitCodeRegistry,
    ) -> Result<CompiledTestcase, CompilationError> {
        let ArtifactState::Precompiled(artifact) = &self.state else {
            return Err(CompilationError::NotPrecompiled(self.name.clone()));
        };

        let executable = self.make_executable_path(precompiled_submission);
        let args: Vec<String> = self
            .arg_lists
            .get(ArgListStage::TestcaseCompilation)
            .iter()
            .chain(self.arg_lists.get(ArgListStage::SubmissionCompilation))
            .cloned()
            .collect();

        match self
            .handler
            .compile_testcase(artifact, precompiled_submission, &executable, exit_codes, &args)
            .await
        {
            Ok(command) => Ok(CompiledTestcase {
                executable,
                command,
            }),
            Err(e) => {
                remove_if_exists(&executable).await?;
                Err(e)
            }
        }
    }
}
