//! Sentinel protocol shared between drover and the prompted agent tools.
//!
//! Prompts instruct the tools to echo fixed markers verbatim when they reach
//! a state transition:
//!
//! - `<<<TOOL:ALL_TASKS_DONE>>>` - every plan task finished
//! - `<<<TOOL:TASK_FAILED>>>` - the current task cannot proceed
//! - `<<<TOOL:REVIEW_DONE>>>` - review pass found nothing further
//! - `<<<TOOL:EXTERNAL_REVIEW_DONE>>>` - external findings all resolved
//! - `<<<TOOL:QUESTION>>> ... <<<TOOL:END>>>` - JSON question for the human
//! - `<<<TOOL:PLAN_READY>>>` - final plan written to disk
//! - `<<<TOOL:PLAN_DRAFT>>> ... <<<TOOL:END>>>` - markdown draft for review
//!
//! Detection scans output for markers in a fixed priority order; the two
//! block forms additionally carry a payload extracted here.

mod parser;
mod types;

pub use parser::{detect_signal, parse_plan_draft_payload, parse_question_payload};
pub use types::{
    ALL_TASKS_DONE, BLOCK_END, EXTERNAL_REVIEW_DONE, PLAN_DRAFT, PLAN_READY, PlanDraftPayload,
    QUESTION, QuestionPayload, REVIEW_DONE, Signal, TASK_FAILED,
};
