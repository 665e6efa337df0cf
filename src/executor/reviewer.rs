//! Secondary-reviewer executor: one-shot reviews through the reviewer CLI.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ReviewerSection;
use crate::errors::ExecError;
use crate::logger::RunLogger;
use crate::process::spawn_group;
use crate::stream::{ParsedStream, parse_noise, parse_plain};

use super::{ExecResult, Executor, check_error_patterns, join_reader, with_timeout};

pub struct ReviewerExecutor {
    section: ReviewerSection,
    logger: Arc<RunLogger>,
}

impl ReviewerExecutor {
    pub fn new(section: ReviewerSection, logger: Arc<RunLogger>) -> Self {
        Self { section, logger }
    }

    async fn run_child(&self, cancel: &CancellationToken, prompt: &str) -> ExecResult {
        let tool = self.section.command.clone();

        let mut cmd = Command::new(&self.section.command);
        cmd.args(self.section.build_args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut guard = match spawn_group(&mut cmd, cancel) {
            Ok(guard) => guard,
            Err(source) => return ExecResult::failed(ExecError::Spawn { tool, source }),
        };

        let (Some(stdout), Some(stderr)) = (
            guard.child_mut().stdout.take(),
            guard.child_mut().stderr.take(),
        ) else {
            return ExecResult::failed(ExecError::StreamRead {
                tool,
                source: std::io::Error::other("child stdio was not piped"),
            });
        };

        // stdout carries the findings whole; live progress comes from the
        // filtered stderr, so stdout is read without display
        let stdout_task = tokio::spawn(async move { parse_plain(stdout, |_| {}).await });
        let err_logger = Arc::clone(&self.logger);
        let err_tool = tool.clone();
        let stderr_task = tokio::spawn(async move {
            parse_noise(stderr, |line| err_logger.tool_line(&err_tool, line)).await
        });

        let stdout_parsed = join_reader(stdout_task).await;
        let stderr_parsed = join_reader(stderr_task).await;
        let wait_result = guard.wait().await;

        classify_outcome(
            tool,
            cancel.is_cancelled(),
            stdout_parsed,
            stderr_parsed,
            wait_result,
        )
    }
}

/// Folds the drained streams and the exit outcome into one result.
///
/// Cancellation wins outright. After that a broken diagnostic stream
/// outranks a stdout read failure, which outranks the exit status; stdout
/// text and signal survive classification either way.
fn classify_outcome(
    tool: String,
    cancelled: bool,
    stdout: ParsedStream,
    stderr: ParsedStream,
    wait_result: std::io::Result<ExitStatus>,
) -> ExecResult {
    let output = stdout.output;
    let signal = stdout.signal;

    let error = if cancelled {
        Some(ExecError::Canceled)
    } else if let Some(source) = stderr.error {
        Some(ExecError::StreamRead { tool, source })
    } else if let Some(source) = stdout.error {
        Some(ExecError::StreamRead { tool, source })
    } else {
        match wait_result {
            Err(source) => Some(ExecError::StreamRead { tool, source }),
            Ok(status) if !status.success() && output.trim().is_empty() => {
                Some(ExecError::NoOutput { tool, status })
            }
            Ok(status) => {
                if !status.success() {
                    debug!(code = ?status.code(), "reviewer exited non-zero with output");
                }
                None
            }
        }
    };

    ExecResult {
        output,
        signal,
        error,
    }
}

#[async_trait]
impl Executor for ReviewerExecutor {
    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> ExecResult {
        let child_token = cancel.child_token();
        let mut result = with_timeout(
            &self.section.command,
            self.section.timeout_secs,
            cancel,
            &child_token,
            self.run_child(&child_token, prompt),
        )
        .await;
        check_error_patterns(
            &mut result,
            &self.section.error_patterns,
            &self.section.help_cmd,
        );
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::signals::Signal;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn create_test_script(dir: &Path, name: &str, content: &str) -> PathBuf {
        let script_path = dir.join(name);
        std::fs::write(&script_path, content).unwrap();
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    fn section_for(script: &Path) -> ReviewerSection {
        ReviewerSection {
            command: script.to_string_lossy().to_string(),
            timeout_secs: None,
            ..ReviewerSection::default()
        }
    }

    fn test_logger(dir: &Path) -> Arc<RunLogger> {
        Arc::new(RunLogger::new(dir.join("progress.log"), false))
    }

    #[tokio::test]
    async fn test_stdout_is_the_unfiltered_output() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "reviewer.sh",
            concat!(
                "#!/bin/sh\n",
                "echo '--------' >&2\n",
                "echo 'model: test' >&2\n",
                "echo '--------' >&2\n",
                "echo '**Reading the diff**' >&2\n",
                "echo 'codex' >&2\n",
                "echo 'summary for display' >&2\n",
                "echo 'finding: the loop never advances'\n",
                "echo '<<<TOOL:EXTERNAL_REVIEW_DONE>>>'\n",
            ),
        );
        let executor = ReviewerExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "review this").await;

        assert!(result.output.contains("finding: the loop never advances"));
        assert!(!result.output.contains("model: test"));
        assert_eq!(result.signal, Some(Signal::ExternalReviewDone));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_output_with_clean_exit_is_ok() {
        let dir = tempdir().unwrap();
        let script = create_test_script(dir.path(), "reviewer.sh", "#!/bin/sh\nexit 0\n");
        let executor = ReviewerExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "review this").await;

        assert!(result.error.is_none());
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_findings_is_soft() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "reviewer.sh",
            "#!/bin/sh\necho 'partial findings'\nexit 1\n",
        );
        let executor = ReviewerExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "review this").await;

        assert!(result.error.is_none());
        assert!(result.output.contains("partial findings"));
    }

    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[test]
    fn test_stderr_read_error_outranks_the_exit_status() {
        let stdout = ParsedStream {
            output: "finding: half a report".to_string(),
            ..ParsedStream::default()
        };
        let stderr = ParsedStream {
            error: Some(std::io::Error::other("diagnostic stream closed early")),
            ..ParsedStream::default()
        };

        let result = classify_outcome(
            "codex".to_string(),
            false,
            stdout,
            stderr,
            Ok(exit_status(1)),
        );

        assert_eq!(result.output, "finding: half a report");
        match result.error {
            Some(ExecError::StreamRead { tool, source }) => {
                assert_eq!(tool, "codex");
                assert_eq!(source.to_string(), "diagnostic stream closed early");
            }
            other => panic!("expected StreamRead, got {:?}", other),
        }
    }

    #[test]
    fn test_cancellation_outranks_stream_and_exit_errors() {
        let stderr = ParsedStream {
            error: Some(std::io::Error::other("torn mid-line")),
            ..ParsedStream::default()
        };

        let result = classify_outcome(
            "codex".to_string(),
            true,
            ParsedStream::default(),
            stderr,
            Ok(exit_status(143)),
        );

        assert!(matches!(result.error, Some(ExecError::Canceled)));
    }

    #[tokio::test]
    async fn test_auth_pattern_carries_reviewer_help() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "reviewer.sh",
            "#!/bin/sh\necho 'ERROR: 401 Unauthorized'\nexit 1\n",
        );
        let executor = ReviewerExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "review this").await;

        match result.error {
            Some(ExecError::PatternMatch { pattern, help_cmd }) => {
                assert_eq!(pattern, "401 unauthorized");
                assert_eq!(help_cmd, "codex login");
            }
            other => panic!("expected PatternMatch, got {:?}", other),
        }
    }
}
