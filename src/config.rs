//! Grading configuration
//!
//! The configuration is read from two TOML files, each with a `[CONFIG]` table.
//! The default file supplies every key; the user file overrides them key by key.
//! The merged table is resolved once into an immutable [`GradingConfig`] that
//! every testcase run reads from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::arglists::{
    parse_numeric_list, parse_timeout_list, ArgListStage, ArgumentLists, ConfigList,
    ResolvedArgLists,
};
use crate::exit_codes::ExitCodeRegistry;
use crate::languages::{self, source_suffix_of};
use crate::testcase_types::TestcaseType;

/// Table holding the grading keys in both config files
pub const CONFIG_SECTION: &str = "CONFIG";

/// Value of `PROGRAMMING_LANGUAGE` / `SOURCE_FILE_NAME` that asks for auto-detection
pub const AUTO: &str = "AUTO";

/// Submission stem expected when `SOURCE_FILE_NAME = "AUTO"`
pub const DEFAULT_SOURCE_FILE_STEM: &str = "Homework";

/// Timeout for testcases covered by neither their own entry nor `ALL`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Weight for testcases covered by neither their own entry nor `ALL`
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Errors that abort a grading run before any testcase is built
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config file {path:?} has no [CONFIG] table")]
    MissingSection { path: PathBuf },

    #[error("Invalid grading config")]
    Invalid(#[source] toml::de::Error),

    #[error("Malformed entry '{entry}' in {key}; expected 'name:value'")]
    MalformedList { key: String, entry: String },

    #[error("Unknown programming language: {language} (supported: {supported:?})")]
    UnknownLanguage {
        language: String,
        supported: Vec<&'static str>,
    },

    #[error("Toolchain for {0} is not installed")]
    NotInstalled(&'static str),

    #[error("Couldn't discover a testcase with correct suffix in {0:?}")]
    NoTestcaseType(PathBuf),

    #[error("Failed to scan testcases directory {path:?}")]
    TestcasesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Merged `[CONFIG]` table before resolution
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawConfig {
    timeout: String,
    generate_results: bool,
    anti_cheat: bool,
    total_points_possible: u32,
    programming_language: String,
    assignment_name: String,
    source_file_name: String,
    lower_source_filename: bool,
    #[serde(default)]
    testcase_weights: String,
    #[serde(default)]
    submission_precompilation_args: String,
    #[serde(default)]
    submission_compilation_args: String,
    #[serde(default)]
    testcase_precompilation_args: String,
    #[serde(default)]
    testcase_compilation_args: String,
}

impl RawConfig {
    fn arg_list_line(&self, stage: ArgListStage) -> &str {
        match stage {
            ArgListStage::SubmissionPrecompilation => &self.submission_precompilation_args,
            ArgListStage::SubmissionCompilation => &self.submission_compilation_args,
            ArgListStage::TestcasePrecompilation => &self.testcase_precompilation_args,
            ArgListStage::TestcaseCompilation => &self.testcase_compilation_args,
        }
    }
}

/// Resolved, read-only grading configuration
#[derive(Debug, Clone)]
pub struct GradingConfig {
    pub testcases_dir: PathBuf,
    pub timeouts: ConfigList<Duration>,
    pub generate_results: bool,
    pub anti_cheat: bool,
    pub total_points_possible: u32,
    /// Precomputed `total_points_possible / 100`
    pub total_score_to_100_ratio: f64,
    /// Source suffix (".c") -> handler
    pub testcase_types: BTreeMap<&'static str, &'static dyn TestcaseType>,
    pub assignment_name: String,
    /// Stem the student's file is matched against and renamed to
    pub source_file_name: String,
    pub auto_source_file_name_enabled: bool,
    pub lower_source_filename: bool,
    pub testcase_weights: ConfigList<f64>,
    pub argument_lists: ArgumentLists,
}

impl GradingConfig {
    /// Read and resolve the layered configuration
    pub fn build(
        testcases_dir: impl Into<PathBuf>,
        user_config: &Path,
        default_config: &Path,
    ) -> Result<Self, ConfigError> {
        let table = read_layered(user_config, default_config)?;
        Self::from_table(testcases_dir, table)
    }

    /// Resolve an already merged `[CONFIG]` table
    pub fn from_table(
        testcases_dir: impl Into<PathBuf>,
        table: toml::Table,
    ) -> Result<Self, ConfigError> {
        let testcases_dir = testcases_dir.into();
        let raw: RawConfig = toml::Value::Table(table)
            .try_into()
            .map_err(ConfigError::Invalid)?;

        let timeouts = parse_timeout_list("TIMEOUT", &raw.timeout)?;
        let testcase_weights = parse_numeric_list("TESTCASE_WEIGHTS", &raw.testcase_weights)?;
        let argument_lists = ArgumentLists::parse(
            ArgListStage::ALL
                .iter()
                .map(|&stage| (stage, raw.arg_list_line(stage))),
        )?;

        let language = raw.programming_language.trim();
        let testcase_types = if language == AUTO {
            discover_testcase_types(&testcases_dir)?
        } else {
            let handler = languages::find_by_name(language)
                .ok_or_else(|| ConfigError::UnknownLanguage {
                    language: language.to_string(),
                    supported: languages::supported_language_names(),
                })?;
            BTreeMap::from([(handler.source_suffix(), handler)])
        };

        let auto_source_file_name_enabled = raw.source_file_name == AUTO;
        let mut source_file_name = if auto_source_file_name_enabled {
            DEFAULT_SOURCE_FILE_STEM.to_string()
        } else {
            raw.source_file_name.clone()
        };
        if raw.lower_source_filename {
            source_file_name = source_file_name.to_lowercase();
        }

        info!(
            "Resolved grading config: assignment={}, languages={:?}, source_file_name={}",
            raw.assignment_name,
            testcase_types.keys().collect::<Vec<_>>(),
            source_file_name
        );

        Ok(Self {
            testcases_dir,
            timeouts,
            generate_results: raw.generate_results,
            anti_cheat: raw.anti_cheat,
            total_points_possible: raw.total_points_possible,
            total_score_to_100_ratio: f64::from(raw.total_points_possible) / 100.0,
            testcase_types,
            assignment_name: raw.assignment_name,
            source_file_name,
            auto_source_file_name_enabled,
            lower_source_filename: raw.lower_source_filename,
            testcase_weights,
            argument_lists,
        })
    }

    /// Execution timeout for a testcase, by file name
    pub fn timeout_for(&self, testcase: &str) -> Duration {
        self.timeouts.get_or(testcase, DEFAULT_TIMEOUT)
    }

    pub fn weight_for(&self, testcase: &str) -> f64 {
        self.testcase_weights.get_or(testcase, DEFAULT_WEIGHT)
    }

    pub fn arglists_for(&self, testcase: &str) -> ResolvedArgLists {
        self.argument_lists.resolve(testcase)
    }

    /// Handler for a source file, if its suffix is one this run grades
    pub fn testcase_type_for(&self, path: &Path) -> Option<&'static dyn TestcaseType> {
        let suffix = source_suffix_of(path)?;
        self.testcase_types.get(suffix.as_str()).copied()
    }

    /// Fresh exit code registry for this run
    pub fn exit_code_registry(&self) -> ExitCodeRegistry {
        if self.anti_cheat {
            ExitCodeRegistry::generate()
        } else {
            warn!("Anti-cheat is disabled; exit codes are not shuffled");
            ExitCodeRegistry::unshuffled()
        }
    }
}

/// Default `[CONFIG]` table overlaid by the user's, key by key
pub fn read_layered(user_config: &Path, default_config: &Path) -> Result<toml::Table, ConfigError> {
    let mut merged = read_section(default_config)?;

    if user_config.exists() {
        for (key, value) in read_section(user_config)? {
            debug!("Config override: {}", key);
            merged.insert(key, value);
        }
    } else {
        warn!(
            "User config {:?} not found, using defaults from {:?}",
            user_config, default_config
        );
    }

    Ok(merged)
}

fn read_section(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut document: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match document.remove(CONFIG_SECTION) {
        Some(toml::Value::Table(section)) => Ok(section),
        _ => Err(ConfigError::MissingSection {
            path: path.to_path_buf(),
        }),
    }
}

/// Every supported language with at least one testcase in `dir`
fn discover_testcase_types(
    dir: &Path,
) -> Result<BTreeMap<&'static str, &'static dyn TestcaseType>, ConfigError> {
    let scan_error = |source| ConfigError::TestcasesDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut testcase_types = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(scan_error)? {
        let path = entry.map_err(scan_error)?.path();
        if let Some(handler) = languages::find_by_path(&path) {
            testcase_types.insert(handler.source_suffix(), handler);
        }
    }

    if testcase_types.is_empty() {
        return Err(ConfigError::NoTestcaseType(dir.to_path_buf()));
    }
    Ok(testcase_types)
}
