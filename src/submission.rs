//! Student submissions
//!
//! A submission is copied into its own working directory before any compiler
//! sees it, then precompiled once and shared by every testcase it is graded
//! against.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::compiler::{remove_if_exists, CompilationError};
use crate::testcase_types::TestcaseType;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Submission {path:?} does not match any of the expected names {expected:?}")]
    Rejected { path: PathBuf, expected: Vec<String> },

    #[error("Submission {0:?} has no usable file name")]
    NoFileName(PathBuf),

    #[error("Failed to copy submission {path:?}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Compilation(#[from] CompilationError),
}

/// Decides whether a submitted file has an acceptable name
pub trait SubmissionFormatChecker: Send + Sync {
    fn is_allowed(&self, submission: &Path, possible_stems: &[String]) -> bool;
}

/// Accepts a submission whose stem equals one of the allowed stems
#[derive(Debug, Clone, Copy, Default)]
pub struct StemFormatChecker {
    /// Compare stems case-insensitively
    pub lower_source_filename: bool,
}

impl SubmissionFormatChecker for StemFormatChecker {
    fn is_allowed(&self, submission: &Path, possible_stems: &[String]) -> bool {
        let Some(stem) = submission.file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        possible_stems.iter().any(|allowed| {
            if self.lower_source_filename {
                stem.to_lowercase() == allowed.to_lowercase()
            } else {
                stem == allowed
            }
        })
    }
}

/// A student's submitted source file
#[derive(Debug, Clone)]
pub struct Submission {
    pub path: PathBuf,
}

impl Submission {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Identifier used in results, the file name without directories
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Validate and copy the submission into `student_dir` as
    /// `<target_stem><source suffix>`, then precompile it.
    ///
    /// The copied source is removed whether or not compilation succeeds.
    pub async fn precompile(
        &self,
        handler: &dyn TestcaseType,
        student_dir: &Path,
        target_stem: &str,
        format_checker: &dyn SubmissionFormatChecker,
        args: &[String],
    ) -> Result<PathBuf, SubmissionError> {
        let own_stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SubmissionError::NoFileName(self.path.clone()))?;

        let possible_stems = if handler.restricts_submission_name() {
            vec![target_stem.to_string()]
        } else {
            vec![own_stem.to_string()]
        };
        if !format_checker.is_allowed(&self.path, &possible_stems) {
            return Err(SubmissionError::Rejected {
                path: self.path.clone(),
                expected: possible_stems,
            });
        }

        let copied = student_dir.join(format!("{}{}", target_stem, handler.source_suffix()));
        tokio::fs::copy(&self.path, &copied)
            .await
            .map_err(|source| SubmissionError::Copy {
                path: self.path.clone(),
                source,
            })?;
        debug!("Copied submission {:?} to {:?}", self.path, copied);

        let result = handler.precompile_submission(&copied, args).await;
        remove_if_exists(&copied).await?;

        let artifact = result?;
        info!("Precompiled submission {} -> {:?}", self.name(), artifact);
        Ok(artifact)
    }
}
