//! Custom-script executor: runs a user-provided script in place of the
//! agent CLI. The prompt travels through a temp file so arbitrary shells
//! never have to quote it.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AgentSection;
use crate::errors::ExecError;
use crate::logger::RunLogger;
use crate::process::spawn_group;
use crate::signals;
use crate::stream::parse_plain;

use super::{ExecResult, Executor, check_error_patterns, join_reader, merge_streams, with_timeout};

pub struct ScriptExecutor {
    section: AgentSection,
    logger: Arc<RunLogger>,
}

impl ScriptExecutor {
    pub fn new(section: AgentSection, logger: Arc<RunLogger>) -> Self {
        Self { section, logger }
    }

    async fn run_child(
        &self,
        script: &Path,
        tool: &str,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> ExecResult {
        let mut prompt_file = match NamedTempFile::new() {
            Ok(file) => file,
            Err(source) => {
                return ExecResult::failed(ExecError::Spawn {
                    tool: tool.to_string(),
                    source,
                });
            }
        };
        if let Err(source) = prompt_file.write_all(prompt.as_bytes()) {
            return ExecResult::failed(ExecError::Spawn {
                tool: tool.to_string(),
                source,
            });
        }

        let mut cmd = Command::new(script);
        cmd.arg(prompt_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut guard = match spawn_group(&mut cmd, cancel) {
            Ok(guard) => guard,
            Err(source) => {
                return ExecResult::failed(ExecError::Spawn {
                    tool: tool.to_string(),
                    source,
                });
            }
        };

        let (Some(stdout), Some(stderr)) = (
            guard.child_mut().stdout.take(),
            guard.child_mut().stderr.take(),
        ) else {
            return ExecResult::failed(ExecError::StreamRead {
                tool: tool.to_string(),
                source: std::io::Error::other("child stdio was not piped"),
            });
        };

        let out_logger = Arc::clone(&self.logger);
        let out_tool = tool.to_string();
        let stdout_task = tokio::spawn(async move {
            parse_plain(stdout, |line| out_logger.tool_line(&out_tool, line)).await
        });
        let err_logger = Arc::clone(&self.logger);
        let err_tool = tool.to_string();
        let stderr_task = tokio::spawn(async move {
            parse_plain(stderr, |line| err_logger.tool_line(&err_tool, line)).await
        });

        let stdout_parsed = join_reader(stdout_task).await;
        let stderr_parsed = join_reader(stderr_task).await;
        let wait_result = guard.wait().await;

        // prompt_file is still alive here; it is removed on drop no matter
        // which path returned above
        let output = merge_streams(stdout_parsed.output, &stderr_parsed.output);
        let signal = signals::detect_signal(&output);
        let tool = tool.to_string();

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
                    if !status.success() {
                        debug!(code = ?status.code(), "script exited non-zero with output");
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
impl Executor for ScriptExecutor {
    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> ExecResult {
        let Some(script) = self.section.script.clone() else {
            return ExecResult::failed(ExecError::ScriptNotConfigured);
        };
        let tool = script
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());

        let child_token = cancel.child_token();
        let mut result = with_timeout(
            &tool,
            self.section.timeout_secs,
            cancel,
            &child_token,
            self.run_child(&script, &tool, &child_token, prompt),
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
