use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict for one testcase of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The testcase reported a score through its exit code
    Graded,
    /// Check-output requested and stdout matched the expected output
    OutputMatched,
    /// Check-output requested and stdout differed
    OutputMismatched,
    /// Submission, testcase or link step failed to build
    CompileError,
    TimeLimitExceeded,
    SystemError,
    CheatAttempt,
}

impl Verdict {
    /// Outcomes the instructor should look at instead of trusting the score
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Verdict::SystemError | Verdict::CheatAttempt)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Graded => "graded",
            Verdict::OutputMatched => "output_matched",
            Verdict::OutputMismatched => "output_mismatched",
            Verdict::CompileError => "compile_error",
            Verdict::TimeLimitExceeded => "time_limit_exceeded",
            Verdict::SystemError => "system_error",
            Verdict::CheatAttempt => "cheat_attempt",
        };
        write!(f, "{}", s)
    }
}
