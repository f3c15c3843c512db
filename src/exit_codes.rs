//! Exit code protocol between a graded program and the grader
//!
//! A testcase reports its result through nothing but its process exit status.
//! The 0..=255 space is split into:
//! - codes reserved by the OS and shell conventions (signals, "command not found", ...)
//! - usable codes, from which every grading run draws a fresh random pool
//!
//! Position `i` in the drawn pool means "the testcase scored `i`". One extra code
//! from the same draw means "ignore the exit code and compare stdout instead".
//! Because the draw is repeated on every run, a submission cannot learn the
//! mapping from one run and replay it in the next.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of distinct result values a testcase can report (0 to 100 inclusive)
pub const EXIT_CODE_COUNT_FOR_RESULTS: usize = 101;

/// Result codes plus the single check-output code
pub const ALLOWED_EXIT_CODE_COUNT: usize = EXIT_CODE_COUNT_FOR_RESULTS + 1;

/// Size of the usable pool: 0, 3..=125 and 166..=254
const USABLE_EXIT_CODE_COUNT: usize = 1 + (125 - 3 + 1) + (254 - 166 + 1);

const _: () = assert!(
    USABLE_EXIT_CODE_COUNT >= ALLOWED_EXIT_CODE_COUNT,
    "usable exit code pool is smaller than the number of codes a run needs"
);

/// Codes owned by the OS: generic failure, shell misuse, "not executable",
/// "not found" and 128+N for death by signal N.
pub fn is_reserved(code: u8) -> bool {
    matches!(code, 1 | 2 | 126..=165 | 255)
}

/// Codes the grader may hand out as result or check-output codes.
pub fn is_usable(code: u8) -> bool {
    matches!(code, 0 | 3..=125 | 166..=254)
}

/// Every usable code in ascending order
pub fn usable_exit_codes() -> Vec<u8> {
    (0..=u8::MAX).filter(|&code| is_usable(code)).collect()
}

/// Semantic meaning of an observed exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCodeEvent {
    /// The process crashed, was killed, or failed at the OS level
    SystemError,
    /// The testcase reported a score
    Result,
    /// The testcase asked the grader to compare its stdout
    CheckOutput,
    /// A plausible code that was not handed out this run
    CheatAttempt,
}

impl fmt::Display for ExitCodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitCodeEvent::SystemError => "system_error",
            ExitCodeEvent::Result => "result",
            ExitCodeEvent::CheckOutput => "check_output",
            ExitCodeEvent::CheatAttempt => "cheat_attempt",
        };
        write!(f, "{}", s)
    }
}

/// Decoded exit code.
///
/// The value only exists for [`ExitCodeEvent::Result`]. There is no default
/// value to fall back to, so an unset value can never pass for a zero score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultFromExitCode {
    event: ExitCodeEvent,
    value: Option<u8>,
}

impl ResultFromExitCode {
    fn result(value: u8) -> Self {
        Self {
            event: ExitCodeEvent::Result,
            value: Some(value),
        }
    }

    fn without_value(event: ExitCodeEvent) -> Self {
        Self { event, value: None }
    }

    pub fn event(&self) -> ExitCodeEvent {
        self.event
    }

    /// The reported result, `None` unless the event is `Result`
    pub fn value(&self) -> Option<u8> {
        self.value
    }

    /// The reported result.
    ///
    /// # Panics
    /// Panics when the event is not `Result`. Reading the value of any other
    /// event is a bug in the caller.
    pub fn expect_value(&self) -> u8 {
        match self.value() {
            Some(value) => value,
            None => panic!(
                "exit code event {} carries no result value; reading it is a contract violation",
                self.event
            ),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExitCodeError {
    #[error("Exit code '{0}' is not possible")]
    OutOfRange(i32),
}

/// Per-run mapping between exit codes and results.
///
/// Built once per grading session and shared read-only by every pipeline.
#[derive(Debug, Clone)]
pub struct ExitCodeRegistry {
    /// `result_codes[i]` is the exit code meaning "result i"
    result_codes: Vec<u8>,
    check_output_code: u8,
}

impl ExitCodeRegistry {
    /// Draw a fresh registry from the thread-local RNG
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::thread_rng())
    }

    /// Draw a fresh registry from the given RNG
    pub fn generate_with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut codes = usable_exit_codes();
        codes.shuffle(rng);
        Self::from_allowed(codes)
    }

    /// Registry without shuffling: result `i` is the `i`-th usable code.
    /// Only meant for debugging testcases with anti-cheat disabled.
    pub fn unshuffled() -> Self {
        Self::from_allowed(usable_exit_codes())
    }

    fn from_allowed(mut codes: Vec<u8>) -> Self {
        codes.truncate(ALLOWED_EXIT_CODE_COUNT);
        // Last drawn code is reserved for check-output
        let check_output_code = codes[EXIT_CODE_COUNT_FOR_RESULTS];
        codes.truncate(EXIT_CODE_COUNT_FOR_RESULTS);

        Self {
            result_codes: codes,
            check_output_code,
        }
    }

    pub fn result_codes(&self) -> &[u8] {
        &self.result_codes
    }

    pub fn check_output_code(&self) -> u8 {
        self.check_output_code
    }

    /// Decode an observed exit code
    pub fn scan(&self, exit_code: i32) -> Result<ResultFromExitCode, ExitCodeError> {
        let code = u8::try_from(exit_code).map_err(|_| ExitCodeError::OutOfRange(exit_code))?;

        if code == self.check_output_code {
            return Ok(ResultFromExitCode::without_value(ExitCodeEvent::CheckOutput));
        }

        if let Some(index) = self.result_codes.iter().position(|&c| c == code) {
            // Pool holds 101 codes, so the index always fits
            return Ok(ResultFromExitCode::result(index as u8));
        }

        if is_reserved(code) {
            Ok(ResultFromExitCode::without_value(ExitCodeEvent::SystemError))
        } else if is_usable(code) {
            // Used by the grader, but not chosen this run
            Ok(ResultFromExitCode::without_value(ExitCodeEvent::CheatAttempt))
        } else {
            Err(ExitCodeError::OutOfRange(exit_code))
        }
    }

    /// Pool rendered for injection into testcases
    pub fn formatted(&self) -> BTreeMap<&'static str, String> {
        let result_codes = self
            .result_codes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");

        BTreeMap::from([
            ("RESULT_EXIT_CODES", result_codes),
            ("CHECK_OUTPUT_EXIT_CODE", self.check_output_code().to_string()),
        ])
    }
}
