//! Primary-agent executor: the agent CLI in unattended streaming mode.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AgentSection;
use crate::errors::ExecError;
use crate::logger::RunLogger;
use crate::process::spawn_group;
use crate::signals;
use crate::stream::{parse_events, parse_plain};

use super::{ExecResult, Executor, check_error_patterns, join_reader, merge_streams, with_timeout};

/// Stripped from the child environment so the agent CLI authenticates with
/// its own login instead of an ambient key.
const CREDENTIAL_VAR: &str = "ANTHROPIC_API_KEY";

pub struct AgentExecutor {
    section: AgentSection,
    logger: Arc<RunLogger>,
}

impl AgentExecutor {
    pub fn new(section: AgentSection, logger: Arc<RunLogger>) -> Self {
        Self { section, logger }
    }

    async fn run_child(&self, cancel: &CancellationToken, prompt: &str) -> ExecResult {
        let tool = self.section.command.clone();

        let mut cmd = Command::new(&self.section.command);
        cmd.args(self.section.build_args(prompt))
            .env_remove(CREDENTIAL_VAR)
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

        // Both readers drain concurrently while we wait for exit
        let out_logger = Arc::clone(&self.logger);
        let out_tool = tool.clone();
        let stdout_task = tokio::spawn(async move {
            parse_events(stdout, |line| out_logger.tool_line(&out_tool, line)).await
        });
        let err_logger = Arc::clone(&self.logger);
        let err_tool = tool.clone();
        let stderr_task = tokio::spawn(async move {
            parse_plain(stderr, |line| err_logger.tool_line(&err_tool, line)).await
        });

        let stdout_parsed = join_reader(stdout_task).await;
        let stderr_parsed = join_reader(stderr_task).await;
        let wait_result = guard.wait().await;

        let output = merge_streams(stdout_parsed.output, &stderr_parsed.output);
        let signal = signals::detect_signal(&output);

        let error = if cancel.is_cancelled() {
            Some(ExecError::Canceled)
        } else if let Some(source) = stdout_parsed.error {
            Some(ExecError::StreamRead { tool, source })
        } else if let Some(source) = stderr_parsed.error {
            Some(ExecError::StreamRead { tool, source })
        } else {
            match wait_result {
                Err(source) => Some(ExecError::StreamRead { tool, source }),
                Ok(status) if !status.success() && output.trim().is_empty() => {
                    Some(ExecError::NoOutput { tool, status })
                }
                Ok(status) => {
                    // Non-zero exit with output still counts; the transcript
                    // may carry a signal or a trigger phrase that explains it
                    if !status.success() {
                        debug!(code = ?status.code(), "agent exited non-zero with output");
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
}

#[async_trait]
impl Executor for AgentExecutor {
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

    fn section_for(script: &Path) -> AgentSection {
        AgentSection {
            command: script.to_string_lossy().to_string(),
            args: Vec::new(),
            timeout_secs: None,
            ..AgentSection::default()
        }
    }

    fn test_logger(dir: &Path) -> Arc<RunLogger> {
        Arc::new(RunLogger::new(dir.join("progress.log"), false))
    }

    #[tokio::test]
    async fn test_parses_stream_json_and_detects_signal() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "agent.sh",
            concat!(
                "#!/bin/sh\n",
                r#"printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"working"}]}}'"#,
                "\n",
                r#"printf '%s\n' '{"type":"result","result":"done <<<TOOL:ALL_TASKS_DONE>>>","is_error":false}'"#,
                "\n",
            ),
        );
        let executor = AgentExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "do the work").await;

        assert_eq!(result.output, "done <<<TOOL:ALL_TASKS_DONE>>>");
        assert_eq!(result.signal, Some(Signal::TasksCompleted));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_output_is_soft() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "agent.sh",
            "#!/bin/sh\necho 'made some progress'\nexit 2\n",
        );
        let executor = AgentExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "prompt").await;

        assert!(result.error.is_none());
        assert!(result.output.contains("made some progress"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_output_is_hard() {
        let dir = tempdir().unwrap();
        let script = create_test_script(dir.path(), "agent.sh", "#!/bin/sh\nexit 2\n");
        let executor = AgentExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "prompt").await;

        match result.error {
            Some(ExecError::NoOutput { status, .. }) => assert_eq!(status.code(), Some(2)),
            other => panic!("expected NoOutput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let dir = tempdir().unwrap();
        let section = AgentSection {
            command: "/nonexistent/agent-binary".to_string(),
            args: Vec::new(),
            timeout_secs: None,
            ..AgentSection::default()
        };
        let executor = AgentExecutor::new(section, test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "prompt").await;

        assert!(matches!(result.error, Some(ExecError::Spawn { .. })));
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_credential_is_stripped_from_child_env() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "agent.sh",
            "#!/bin/sh\necho \"key=${ANTHROPIC_API_KEY:-stripped}\"\n",
        );
        unsafe { std::env::set_var(CREDENTIAL_VAR, "sk-test-not-for-children") };
        let executor = AgentExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "prompt").await;

        assert!(result.output.contains("key=stripped"));
    }

    #[tokio::test]
    async fn test_pattern_match_overrides_exit_classification() {
        let dir = tempdir().unwrap();
        let script = create_test_script(
            dir.path(),
            "agent.sh",
            "#!/bin/sh\necho 'Error: Invalid API Key'\nexit 1\n",
        );
        let executor = AgentExecutor::new(section_for(&script), test_logger(dir.path()));

        let result = executor.run(&CancellationToken::new(), "prompt").await;

        match result.error {
            Some(ExecError::PatternMatch { pattern, help_cmd }) => {
                assert_eq!(pattern, "invalid api key");
                assert_eq!(help_cmd, "claude /login");
            }
            other => panic!("expected PatternMatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_tears_down_the_child() {
        let dir = tempdir().unwrap();
        let script = create_test_script(dir.path(), "agent.sh", "#!/bin/sh\nsleep 30\n");
        let section = AgentSection {
            timeout_secs: Some(1),
            ..section_for(&script)
        };
        let executor = AgentExecutor::new(section, test_logger(dir.path()));

        let start = std::time::Instant::now();
        let result = executor.run(&CancellationToken::new(), "prompt").await;

        assert!(matches!(result.error, Some(ExecError::Timeout { secs: 1, .. })));
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_is_reported_distinctly() {
        let dir = tempdir().unwrap();
        let script = create_test_script(dir.path(), "agent.sh", "#!/bin/sh\nsleep 30\n");
        let executor = AgentExecutor::new(section_for(&script), test_logger(dir.path()));

        let cancel = CancellationToken::new();
        let run = executor.run(&cancel, "prompt");
        let canceller = async {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            cancel.cancel();
        };

        let start = std::time::Instant::now();
        let (result, ()) = tokio::join!(run, canceller);

        assert!(matches!(result.error, Some(ExecError::Canceled)));
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }
}
