//! Supported testcase languages
//!
//! Language selection is a lookup into a fixed table of handlers, either by the
//! name configured in `PROGRAMMING_LANGUAGE` (or one of its aliases) or by a
//! testcase's source suffix. Nothing outside `testcase_types` knows how a
//! language is built.

use std::path::Path;

use crate::testcase_types::c_family::{C, CPP};
use crate::testcase_types::python::PYTHON;
use crate::testcase_types::TestcaseType;

static ALLOWED_LANGUAGES: &[&dyn TestcaseType] = &[&C, &CPP, &PYTHON];

/// Every language the grader knows how to build
pub fn allowed_languages() -> &'static [&'static dyn TestcaseType] {
    ALLOWED_LANGUAGES
}

/// Look a handler up by normalized name or alias
pub fn find_by_name(language: &str) -> Option<&'static dyn TestcaseType> {
    let language = language.trim().to_lowercase();
    ALLOWED_LANGUAGES
        .iter()
        .copied()
        .find(|handler| handler.name() == language || handler.aliases().contains(&language.as_str()))
}

/// Look a handler up by source suffix, including the dot (".c")
pub fn find_by_suffix(suffix: &str) -> Option<&'static dyn TestcaseType> {
    ALLOWED_LANGUAGES
        .iter()
        .copied()
        .find(|handler| handler.source_suffix() == suffix)
}

pub fn find_by_path(path: &Path) -> Option<&'static dyn TestcaseType> {
    find_by_suffix(&source_suffix_of(path)?)
}

/// Suffix of a file name with its leading dot
pub fn source_suffix_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
}

/// Names of every supported language
pub fn supported_language_names() -> Vec<&'static str> {
    allowed_languages().iter().map(|handler| handler.name()).collect()
}
