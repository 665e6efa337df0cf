//! Typed error hierarchy for the drover runner.
//!
//! Three top-level enums cover the three subsystems:
//! - `ExecError` — classified failures of a single executor call
//! - `PayloadError` — sentinel payload extraction failures
//! - `RunnerError` — phase state machine failures

use thiserror::Error;

use crate::phase::Phase;

/// Classified failures of one executor invocation.
///
/// These travel inside [`crate::executor::ExecResult`] rather than as the
/// function's error channel, so partial output and a detected signal survive
/// classification.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {tool} output: {source}")]
    StreamRead {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} {status} and produced no output")]
    NoOutput {
        tool: String,
        status: std::process::ExitStatus,
    },

    #[error("{tool} produced no output after {secs}s, timed out")]
    Timeout { tool: String, secs: u64 },

    #[error("Run canceled")]
    Canceled,

    #[error("Tool output matched error pattern {pattern:?} (try `{help_cmd}`)")]
    PatternMatch { pattern: String, help_cmd: String },

    #[error("Custom script agent selected but no script path is configured")]
    ScriptNotConfigured,
}

/// Two-tier failures of bounded-block payload extraction.
///
/// `Absent` is the expected case (no block in this output); `Malformed`
/// means the block is there but its contents are unusable, which points at
/// an upstream tool bug and is surfaced as a warning.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("No {kind} block found in output")]
    Absent { kind: &'static str },

    #[error("Malformed {kind} block: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

impl PayloadError {
    /// True for the expected no-block-present case.
    pub fn is_absent(&self) -> bool {
        matches!(self, PayloadError::Absent { .. })
    }
}

/// Errors from the phase state machine.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{phase} phase exhausted its budget of {iterations} iterations")]
    BudgetExhausted { phase: Phase, iterations: u32 },

    #[error("Task phase failed {attempts} times, retry budget exhausted")]
    TaskFailed { attempts: u32 },

    #[error("Plan draft rejected")]
    DraftRejected,

    #[error("Run canceled")]
    Canceled,

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_error_spawn_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "claude not found");
        let err = ExecError::Spawn {
            tool: "claude".into(),
            source: io_err,
        };
        match &err {
            ExecError::Spawn { tool, source } => {
                assert_eq!(tool, "claude");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected Spawn variant"),
        }
    }

    #[test]
    fn exec_error_pattern_match_carries_remediation() {
        let err = ExecError::PatternMatch {
            pattern: "credit balance is too low".into(),
            help_cmd: "claude /login".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("credit balance is too low"));
        assert!(msg.contains("claude /login"));
    }

    #[test]
    fn payload_absent_and_malformed_are_distinct() {
        let absent = PayloadError::Absent { kind: "question" };
        let malformed = PayloadError::Malformed {
            kind: "question",
            reason: "invalid JSON".into(),
        };
        assert!(absent.is_absent());
        assert!(!malformed.is_absent());
        assert!(matches!(absent, PayloadError::Absent { .. }));
        assert!(matches!(malformed, PayloadError::Malformed { .. }));
    }

    #[test]
    fn runner_error_budget_exhausted_carries_phase_and_count() {
        let err = RunnerError::BudgetExhausted {
            phase: Phase::Task,
            iterations: 40,
        };
        match &err {
            RunnerError::BudgetExhausted { iterations, .. } => assert_eq!(*iterations, 40),
            _ => panic!("Expected BudgetExhausted"),
        }
        assert!(err.to_string().contains("40"));
    }

    #[test]
    fn runner_error_converts_from_exec_error() {
        let inner = ExecError::Canceled;
        let err: RunnerError = inner.into();
        assert!(matches!(err, RunnerError::Exec(ExecError::Canceled)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ExecError::Canceled);
        assert_std_error(&PayloadError::Absent { kind: "plan draft" });
        assert_std_error(&RunnerError::DraftRejected);
    }
}
