//! Per-testcase config lists and compiler argument lists
//!
//! List-valued config entries share one grammar:
//! `name:value, name:value, ALL:value`
//!
//! `ALL` supplies the value for every testcase that is not listed by name.
//! Looking up a testcase that is neither listed nor covered by `ALL` is not
//! an error; callers pick their own default.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::ConfigError;

/// Sentinel entry that applies to every unlisted testcase
pub const ALL_TESTCASES: &str = "ALL";

/// Pipeline stage an argument list is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgListStage {
    SubmissionPrecompilation,
    SubmissionCompilation,
    TestcasePrecompilation,
    TestcaseCompilation,
}

impl ArgListStage {
    pub const ALL: [ArgListStage; 4] = [
        ArgListStage::SubmissionPrecompilation,
        ArgListStage::SubmissionCompilation,
        ArgListStage::TestcasePrecompilation,
        ArgListStage::TestcaseCompilation,
    ];

    /// Config key holding this stage's list
    pub fn config_key(&self) -> &'static str {
        match self {
            ArgListStage::SubmissionPrecompilation => "SUBMISSION_PRECOMPILATION_ARGS",
            ArgListStage::SubmissionCompilation => "SUBMISSION_COMPILATION_ARGS",
            ArgListStage::TestcasePrecompilation => "TESTCASE_PRECOMPILATION_ARGS",
            ArgListStage::TestcaseCompilation => "TESTCASE_COMPILATION_ARGS",
        }
    }
}

/// Parsed `name:value` list
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigList<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for ConfigList<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> ConfigList<T> {
    /// Value for `testcase`, falling back to the `ALL` entry
    pub fn get(&self, testcase: &str) -> Option<&T> {
        self.entries
            .get(testcase)
            .or_else(|| self.entries.get(ALL_TESTCASES))
    }

}

impl<T: Clone> ConfigList<T> {
    pub fn get_or(&self, testcase: &str, default: T) -> T {
        self.get(testcase).cloned().unwrap_or(default)
    }
}

/// Parse one config line.
///
/// `key` is only used for error messages. `parse_value` returns `None` when a
/// value is malformed.
pub fn parse_config_list<T, F>(key: &str, line: &str, parse_value: F) -> Result<ConfigList<T>, ConfigError>
where
    F: Fn(&str) -> Option<T>,
{
    let mut entries = HashMap::new();

    for entry in line.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let malformed = || ConfigError::MalformedList {
            key: key.to_string(),
            entry: entry.to_string(),
        };

        let (name, value) = entry.split_once(':').ok_or_else(malformed)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(malformed());
        }

        let value = parse_value(value.trim()).ok_or_else(malformed)?;
        entries.insert(name.to_string(), value);
    }

    Ok(ConfigList { entries })
}

/// Parse a list of non-negative numbers (timeouts, weights)
pub fn parse_numeric_list(key: &str, line: &str) -> Result<ConfigList<f64>, ConfigError> {
    parse_config_list(key, line, |value| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
    })
}

/// Parse a list of timeouts in seconds. Values a `Duration` cannot hold
/// (negative, NaN, or absurdly large) are malformed.
pub fn parse_timeout_list(key: &str, line: &str) -> Result<ConfigList<Duration>, ConfigError> {
    parse_config_list(key, line, |value| {
        value
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    })
}

fn into_tokens(value: &str) -> Option<Vec<String>> {
    Some(value.split_whitespace().map(|s| s.to_string()).collect())
}

/// Argument lists of all stages, keyed by testcase name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentLists {
    lists: BTreeMap<ArgListStage, ConfigList<Vec<String>>>,
}

impl ArgumentLists {
    /// Parse every stage's raw config line
    pub fn parse<'a>(
        lines: impl IntoIterator<Item = (ArgListStage, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut lists = BTreeMap::new();
        for (stage, line) in lines {
            let list = parse_config_list(stage.config_key(), line, into_tokens)?;
            lists.insert(stage, list);
        }
        Ok(Self { lists })
    }

    /// Tokens for one stage and testcase; empty when nothing applies
    pub fn lookup(&self, stage: ArgListStage, testcase: &str) -> Vec<String> {
        self.lists
            .get(&stage)
            .and_then(|list| list.get(testcase))
            .cloned()
            .unwrap_or_default()
    }

    /// Lists of every stage for one testcase
    pub fn resolve(&self, testcase: &str) -> ResolvedArgLists {
        let lists = ArgListStage::ALL
            .iter()
            .map(|&stage| (stage, self.lookup(stage, testcase)))
            .collect();
        ResolvedArgLists { lists }
    }
}

/// Argument lists already resolved for a single testcase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgLists {
    lists: BTreeMap<ArgListStage, Vec<String>>,
}

impl ResolvedArgLists {
    pub fn get(&self, stage: ArgListStage) -> &[String] {
        self.lists.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }
}
