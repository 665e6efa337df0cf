//! Tool executors.
//!
//! Each executor wraps one external tool behind the same async contract:
//! feed it a prompt, stream its output live, come back with the transcript,
//! any completion signal, and a classified error. The runner never learns
//! which binary ran; it matches on the result. Tests swap in scripted
//! executors that return canned results without spawning anything.

mod agent;
mod reviewer;
mod script;

pub use agent::AgentExecutor;
pub use reviewer::ReviewerExecutor;
pub use script::ScriptExecutor;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::ExecError;
use crate::signals::Signal;
use crate::stream::ParsedStream;

/// Outcome of one tool invocation.
///
/// Output, signal, and error coexist. A child can print a completion marker
/// and still exit non-zero, or fail mid-stream after useful partial output;
/// the runner classifies instead of short-circuiting.
#[derive(Debug, Default)]
pub struct ExecResult {
    pub output: String,
    pub signal: Option<Signal>,
    pub error: Option<ExecError>,
}

impl ExecResult {
    pub fn failed(error: ExecError) -> Self {
        Self {
            output: String::new(),
            signal: None,
            error: Some(error),
        }
    }
}

/// One external tool behind an async run contract.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the tool once with `prompt`, honoring `cancel` for teardown.
    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> ExecResult;
}

/// Scan output for the first configured trigger phrase, case-insensitive.
///
/// A match replaces whatever error the run produced: a non-zero exit caused
/// by a dead credential should surface as "run `claude /login`", not as a
/// bare exit code. A detected signal is left in place.
fn check_error_patterns(result: &mut ExecResult, patterns: &[String], help_cmd: &str) {
    let lowered = result.output.to_lowercase();
    for pattern in patterns {
        if lowered.contains(&pattern.to_lowercase()) {
            result.error = Some(ExecError::PatternMatch {
                pattern: pattern.clone(),
                help_cmd: help_cmd.to_string(),
            });
            return;
        }
    }
}

/// Run a child invocation with an optional wall-clock budget.
///
/// On elapse the child-scoped token is cancelled so the process group dies,
/// then the invocation is awaited to completion and its error replaced with
/// `Timeout` (unless the whole run was being cancelled anyway).
async fn with_timeout<F>(
    tool: &str,
    secs: Option<u64>,
    cancel: &CancellationToken,
    child_token: &CancellationToken,
    run: F,
) -> ExecResult
where
    F: Future<Output = ExecResult>,
{
    let Some(secs) = secs else { return run.await };

    tokio::pin!(run);
    tokio::select! {
        result = &mut run => result,
        _ = tokio::time::sleep(Duration::from_secs(secs)) => {
            child_token.cancel();
            let mut result = run.await;
            if !cancel.is_cancelled() {
                result.error = Some(ExecError::Timeout {
                    tool: tool.to_string(),
                    secs,
                });
            }
            result
        }
    }
}

/// Await a spawned stream reader, degrading to an empty parse on panic.
async fn join_reader(task: tokio::task::JoinHandle<ParsedStream>) -> ParsedStream {
    match task.await {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "stream reader task failed");
            ParsedStream::default()
        }
    }
}

/// Concatenate a child's two streams into one transcript, stdout first.
fn merge_streams(mut stdout: String, stderr: &str) -> String {
    if !stderr.is_empty() {
        if !stdout.is_empty() && !stdout.ends_with('\n') {
            stdout.push('\n');
        }
        stdout.push_str(stderr);
    }
    stdout
}
