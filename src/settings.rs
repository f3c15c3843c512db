//! Process-level settings read from the environment (and `.env`)

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::grader::SessionOptions;

#[derive(Debug, Clone)]
pub struct Settings {
    pub testcases_dir: PathBuf,
    pub submissions_dir: PathBuf,
    pub user_config: PathBuf,
    pub default_config: PathBuf,
    /// Expected outputs for testcases that ask for output checking
    pub output_dir: Option<PathBuf>,
    /// Where per-submission result files go when `GENERATE_RESULTS` is on
    pub results_dir: PathBuf,
    pub max_parallel: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let path = |key: &str, default: &str| -> PathBuf {
            std::env::var(key).unwrap_or_else(|_| default.into()).into()
        };

        let max_parallel = match std::env::var("GRADER_MAX_PARALLEL") {
            Ok(value) => value
                .parse::<usize>()
                .with_context(|| format!("Invalid GRADER_MAX_PARALLEL: {}", value))?
                .max(1),
            Err(_) => 4,
        };

        Ok(Self {
            testcases_dir: path("GRADER_TESTCASES_DIR", "./tests"),
            submissions_dir: path("GRADER_SUBMISSIONS_DIR", "./submissions"),
            user_config: path("GRADER_CONFIG", "./config.toml"),
            default_config: path("GRADER_DEFAULT_CONFIG", "./files/default_config.toml"),
            output_dir: std::env::var("GRADER_OUTPUT_DIR").ok().map(PathBuf::from),
            results_dir: path("GRADER_RESULTS_DIR", "./results"),
            max_parallel,
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            expected_output_dir: self.output_dir.clone(),
            max_parallel: self.max_parallel,
        }
    }
}
