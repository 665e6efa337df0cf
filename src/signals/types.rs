//! Sentinel marker constants and payload types.

use std::fmt;

use serde::Deserialize;

/// Emitted when every task in the plan is complete.
pub const ALL_TASKS_DONE: &str = "<<<TOOL:ALL_TASKS_DONE>>>";
/// Emitted when the tool cannot make progress on the current task.
pub const TASK_FAILED: &str = "<<<TOOL:TASK_FAILED>>>";
/// Emitted when a review pass has nothing further to fix.
pub const REVIEW_DONE: &str = "<<<TOOL:REVIEW_DONE>>>";
/// Emitted when all external-review findings are resolved.
pub const EXTERNAL_REVIEW_DONE: &str = "<<<TOOL:EXTERNAL_REVIEW_DONE>>>";
/// Opens a question block addressed to the human operator.
pub const QUESTION: &str = "<<<TOOL:QUESTION>>>";
/// Emitted when the final plan file has been written.
pub const PLAN_READY: &str = "<<<TOOL:PLAN_READY>>>";
/// Opens a markdown plan-draft block for human review.
pub const PLAN_DRAFT: &str = "<<<TOOL:PLAN_DRAFT>>>";
/// Closes a question or plan-draft block.
pub const BLOCK_END: &str = "<<<TOOL:END>>>";

/// A state transition detected in tool output.
///
/// At most one signal is reported per executor call; when several markers
/// appear in the same output, [`Signal::PRIORITY`] decides which one wins,
/// regardless of position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    TasksCompleted,
    TaskFailed,
    ReviewDone,
    ExternalReviewDone,
    QuestionPending,
    PlanReady,
    PlanDraftReady,
}

impl Signal {
    /// Fixed detection order; earlier entries win over later ones.
    pub const PRIORITY: [Signal; 7] = [
        Signal::TasksCompleted,
        Signal::TaskFailed,
        Signal::ReviewDone,
        Signal::ExternalReviewDone,
        Signal::QuestionPending,
        Signal::PlanReady,
        Signal::PlanDraftReady,
    ];

    /// The exact marker string the tool must echo for this signal.
    pub fn marker(&self) -> &'static str {
        match self {
            Signal::TasksCompleted => ALL_TASKS_DONE,
            Signal::TaskFailed => TASK_FAILED,
            Signal::ReviewDone => REVIEW_DONE,
            Signal::ExternalReviewDone => EXTERNAL_REVIEW_DONE,
            Signal::QuestionPending => QUESTION,
            Signal::PlanReady => PLAN_READY,
            Signal::PlanDraftReady => PLAN_DRAFT,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::TasksCompleted => "task-completed",
            Signal::TaskFailed => "task-failed",
            Signal::ReviewDone => "review-done",
            Signal::ExternalReviewDone => "external-review-done",
            Signal::QuestionPending => "question-pending",
            Signal::PlanReady => "plan-ready",
            Signal::PlanDraftReady => "plan-draft-ready",
        };
        write!(f, "{name}")
    }
}

/// A question the tool wants the human operator to answer.
///
/// Parsed from the JSON body of a `QUESTION` block. `question` and at least
/// one option are required; a payload missing either is malformed, never
/// silently defaulted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionPayload {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// The markdown body of a `PLAN_DRAFT` block.
///
/// Opaque to drover; it is shown to the human verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDraftPayload {
    pub markdown: String,
}
