//! Configuration for drover.
//!
//! Two layers, flattened once per run:
//! - `DroverToml` — the on-disk `drover.toml` file, searched in the project
//!   directory then the user config dir, with serde defaults for every field
//! - `RunnerConfig` — the immutable per-run snapshot handed to the runner,
//!   built from the file plus CLI overrides; prompt templates are resolved
//!   (plan path substituted) at build time and never change mid-run
//!
//! # Configuration File Format
//!
//! ```toml
//! [run]
//! mode = "full"
//! max_iterations = 40
//! task_retries = 2
//! iteration_delay_secs = 2
//! finalize = true
//!
//! [agent]
//! command = "claude"
//! args = ["--dangerously-skip-permissions", "--output-format", "stream-json", "--verbose"]
//! error_patterns = ["credit balance is too low"]
//! help_cmd = "claude /login"
//!
//! [reviewer]
//! command = "codex"
//! model = "gpt-5-codex"
//! reasoning_effort = "medium"
//! sandbox = "read-only"
//! idle_timeout_ms = 300000
//!
//! [prompts]
//! task = "custom task prompt mentioning {plan_path}"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::plan;

/// Pipeline mode selecting which phases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// task -> review -> external review -> review -> finalize
    #[default]
    Full,
    /// Skip the task phase, run both review stages and finalize
    ReviewOnly,
    /// Run only the external review exchange, a review pass, and finalize
    ExternalReviewOnly,
    /// Run the task phase alone
    TasksOnly,
    /// Interactive plan drafting
    Plan,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Full => "full",
            Mode::ReviewOnly => "review-only",
            Mode::ExternalReviewOnly => "external-review-only",
            Mode::TasksOnly => "tasks-only",
            Mode::Plan => "plan",
        };
        write!(f, "{name}")
    }
}

/// `[run]` section: iteration budgets and toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub mode: Mode,
    /// Task-phase iteration budget; review/plan loop bounds derive from it
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Retries after the first task failure before the run hard-fails
    #[serde(default = "default_task_retries")]
    pub task_retries: u32,
    /// Pause between iterations of the same loop
    #[serde(default = "default_iteration_delay_secs")]
    pub iteration_delay_secs: u64,
    /// Run the best-effort finalize step at the end of review pipelines
    #[serde(default = "default_finalize")]
    pub finalize: bool,
    /// Progress log location (default: .drover/progress.log)
    #[serde(default)]
    pub progress_file: Option<PathBuf>,
}

fn default_max_iterations() -> u32 {
    40
}

fn default_task_retries() -> u32 {
    2
}

fn default_iteration_delay_secs() -> u64 {
    2
}

fn default_finalize() -> bool {
    true
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            max_iterations: default_max_iterations(),
            task_retries: default_task_retries(),
            iteration_delay_secs: default_iteration_delay_secs(),
            finalize: default_finalize(),
            progress_file: None,
        }
    }
}

/// `[agent]` section: the primary agent tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_command")]
    pub command: String,
    /// Unattended/streaming/verbose flags; the prompt is appended as `-p <prompt>`
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// When set, a custom script replaces the agent CLI; it receives one
    /// argument, the path of a temp file holding the prompt
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Trigger phrases that mark an otherwise successful call as failed
    #[serde(default = "default_agent_error_patterns")]
    pub error_patterns: Vec<String>,
    /// Remediation hint reported alongside a pattern match
    #[serde(default = "default_agent_help_cmd")]
    pub help_cmd: String,
    /// Optional wall-clock limit per call
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec![
        "--dangerously-skip-permissions".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ]
}

fn default_agent_error_patterns() -> Vec<String> {
    vec![
        "credit balance is too low".to_string(),
        "invalid api key".to_string(),
        "oauth token has expired".to_string(),
    ]
}

fn default_agent_help_cmd() -> String {
    "claude /login".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            script: None,
            error_patterns: default_agent_error_patterns(),
            help_cmd: default_agent_help_cmd(),
            timeout_secs: None,
        }
    }
}

impl AgentSection {
    /// Full argv for one primary-agent call: configured flags, then the
    /// prompt as the final `-p` argument.
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("-p".to_string());
        args.push(prompt.to_string());
        args
    }
}

/// `[reviewer]` section: the secondary reviewer tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerSection {
    #[serde(default = "default_reviewer_command")]
    pub command: String,
    #[serde(default = "default_reviewer_model")]
    pub model: String,
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,
    /// Sandbox policy override; the reviewer only needs to read
    #[serde(default = "default_sandbox")]
    pub sandbox: String,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Project-doc override forwarded as an instructions-file config key
    #[serde(default)]
    pub instructions_file: Option<PathBuf>,
    #[serde(default = "default_reviewer_error_patterns")]
    pub error_patterns: Vec<String>,
    #[serde(default = "default_reviewer_help_cmd")]
    pub help_cmd: String,
    /// Optional wall-clock limit per call
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_reviewer_command() -> String {
    "codex".to_string()
}

fn default_reviewer_model() -> String {
    "gpt-5-codex".to_string()
}

fn default_reasoning_effort() -> String {
    "medium".to_string()
}

fn default_sandbox() -> String {
    "read-only".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

fn default_reviewer_error_patterns() -> Vec<String> {
    vec![
        "401 unauthorized".to_string(),
        "stream error: exceeded retry limit".to_string(),
    ]
}

fn default_reviewer_help_cmd() -> String {
    "codex login".to_string()
}

impl Default for ReviewerSection {
    fn default() -> Self {
        Self {
            command: default_reviewer_command(),
            model: default_reviewer_model(),
            reasoning_effort: default_reasoning_effort(),
            sandbox: default_sandbox(),
            idle_timeout_ms: default_idle_timeout_ms(),
            instructions_file: None,
            error_patterns: default_reviewer_error_patterns(),
            help_cmd: default_reviewer_help_cmd(),
            timeout_secs: None,
        }
    }
}

impl ReviewerSection {
    /// Full argv for one reviewer call: the `exec` subcommand, `-c` config
    /// overrides, then the prompt as the last positional argument.
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        let mut push_override = |args: &mut Vec<String>, key: &str, value: String| {
            args.push("-c".to_string());
            args.push(format!("{key}={value}"));
        };
        push_override(&mut args, "model", self.model.clone());
        push_override(
            &mut args,
            "model_reasoning_effort",
            self.reasoning_effort.clone(),
        );
        push_override(
            &mut args,
            "stream_idle_timeout_ms",
            self.idle_timeout_ms.to_string(),
        );
        push_override(&mut args, "sandbox_mode", self.sandbox.clone());
        if let Some(file) = &self.instructions_file {
            push_override(
                &mut args,
                "experimental_instructions_file",
                file.display().to_string(),
            );
        }
        args.push(prompt.to_string());
        args
    }
}

/// `[prompts]` section: per-phase template overrides.
///
/// Templates may reference `{plan_path}`; it is substituted once when the
/// run snapshot is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsSection {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub review: Option<String>,
    #[serde(default)]
    pub review_continue: Option<String>,
    #[serde(default)]
    pub external_review: Option<String>,
    #[serde(default)]
    pub evaluate: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub finalize: Option<String>,
}

const TASK_PROMPT: &str = r#"Open {plan_path} and find the first unchecked task (a `- [ ]` line). Complete that one task, then mark its checkbox `- [x]`. Do not start another task.

When EVERY task in the plan is checked, output <<<TOOL:ALL_TASKS_DONE>>> on its own line.
If you are blocked and cannot complete the current task, explain why and output <<<TOOL:TASK_FAILED>>>."#;

const REVIEW_PROMPT: &str = r#"Review the implementation of the plan at {plan_path} against the current state of the repository. Look for defects, missing edge cases, and departures from the plan; fix what you find.

When the implementation needs no further changes, output <<<TOOL:REVIEW_DONE>>> on its own line."#;

const REVIEW_CONTINUE_PROMPT: &str = r#"Continue the review of {plan_path}. Address any findings left open by your previous pass.

When the implementation needs no further changes, output <<<TOOL:REVIEW_DONE>>> on its own line."#;

const EXTERNAL_REVIEW_PROMPT: &str = r#"You are an independent reviewer. Examine the repository changes implementing the plan at {plan_path} and report concrete, actionable defects: incorrect behavior, broken edge cases, missing error handling. Skip style commentary.

If there is nothing of substance to report, reply with an empty response."#;

const EVALUATE_PROMPT: &str = r#"An external reviewer examined the implementation of {plan_path} and reported the findings below. Evaluate each finding: fix the valid ones, and state briefly why any invalid one does not apply.

When every finding is either fixed or rejected with a reason, output <<<TOOL:EXTERNAL_REVIEW_DONE>>> on its own line."#;

const PLAN_PROMPT: &str = r#"You are drafting an implementation plan that will be saved to {plan_path}.

Work out what needs to be built. When a requirement is ambiguous, ask the operator: output <<<TOOL:QUESTION>>>, then a JSON object {"question": "...", "options": ["...", "..."], "context": "..."} (context optional), then <<<TOOL:END>>>.

When you have a complete draft, output it as markdown between <<<TOOL:PLAN_DRAFT>>> and <<<TOOL:END>>> and wait for the operator's verdict, which arrives in your next prompt.

Once the operator approves, write the final plan to {plan_path} as a markdown task list (`- [ ]` items) and output <<<TOOL:PLAN_READY>>> on its own line."#;

const FINALIZE_PROMPT: &str = r#"All pipeline phases are complete. Verify the checkboxes in {plan_path} reflect what was actually done, tidy any stray scratch files you created, and summarize the changes in a few sentences.

If something prevents you from finishing, output <<<TOOL:TASK_FAILED>>>."#;

/// Per-phase prompt texts with `{plan_path}` already substituted.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub task: String,
    pub review: String,
    pub review_continue: String,
    pub external_review: String,
    pub evaluate: String,
    pub plan: String,
    pub finalize: String,
}

impl Prompts {
    fn resolve(section: &PromptsSection, plan_path: &Path) -> Self {
        let path = plan_path.display().to_string();
        let fill = |override_text: &Option<String>, template: &str| {
            override_text
                .as_deref()
                .unwrap_or(template)
                .replace("{plan_path}", &path)
        };
        Self {
            task: fill(&section.task, TASK_PROMPT),
            review: fill(&section.review, REVIEW_PROMPT),
            review_continue: fill(&section.review_continue, REVIEW_CONTINUE_PROMPT),
            external_review: fill(&section.external_review, EXTERNAL_REVIEW_PROMPT),
            evaluate: fill(&section.evaluate, EVALUATE_PROMPT),
            plan: fill(&section.plan, PLAN_PROMPT),
            finalize: fill(&section.finalize, FINALIZE_PROMPT),
        }
    }
}

/// The `drover.toml` file model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DroverToml {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub reviewer: ReviewerSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

impl DroverToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `drover.toml` from the project directory, then the user config
    /// dir, falling back to embedded defaults.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let local = project_dir.join("drover.toml");
        if local.exists() {
            return Self::load(&local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let global = config_dir.join("drover").join("drover.toml");
            if global.exists() {
                return Self::load(&global);
            }
        }
        Ok(Self::default())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize drover.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// CLI overrides applied on top of the file when building the snapshot.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub mode: Option<Mode>,
    pub plan_file: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub task_retries: Option<u32>,
    pub no_finalize: bool,
}

/// Immutable per-run snapshot consumed by the runner and executors.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mode: Mode,
    pub plan_file: PathBuf,
    pub progress_file: PathBuf,
    pub max_iterations: u32,
    pub task_retries: u32,
    pub iteration_delay: Duration,
    pub finalize: bool,
    pub prompts: Prompts,
    pub agent: AgentSection,
    pub reviewer: ReviewerSection,
}

impl RunnerConfig {
    /// Flatten file config and CLI overrides into one snapshot.
    ///
    /// Plan mode accepts a not-yet-existing plan path (the run creates it);
    /// every other mode requires an existing plan file, discovered via
    /// [`plan::find_plan_file`] when not given explicitly.
    pub fn build(project_dir: &Path, toml: DroverToml, overrides: RunOverrides) -> Result<Self> {
        let mode = overrides.mode.unwrap_or(toml.run.mode);

        let plan_file = match (overrides.plan_file, mode) {
            (Some(path), _) => path,
            (None, Mode::Plan) => project_dir.join("PLAN.md"),
            (None, _) => plan::find_plan_file(project_dir)?,
        };

        let progress_file = toml
            .run
            .progress_file
            .clone()
            .unwrap_or_else(|| project_dir.join(".drover").join("progress.log"));

        let prompts = Prompts::resolve(&toml.prompts, &plan_file);

        Ok(Self {
            mode,
            plan_file,
            progress_file,
            max_iterations: overrides.max_iterations.unwrap_or(toml.run.max_iterations),
            task_retries: overrides.task_retries.unwrap_or(toml.run.task_retries),
            iteration_delay: Duration::from_secs(toml.run.iteration_delay_secs),
            finalize: toml.run.finalize && !overrides.no_finalize,
            prompts,
            agent: toml.agent,
            reviewer: toml.reviewer,
        })
    }
}
