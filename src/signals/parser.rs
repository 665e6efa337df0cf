//! Sentinel detection and bounded-block payload extraction.
//!
//! Detection is a plain substring scan in priority order. Payload blocks
//! are cut out with a non-greedy regex between the opening marker and the
//! first `<<<TOOL:END>>>`; a payload that itself contains the closing
//! marker is truncated there (the protocol defines no escaping).

use regex::Regex;
use std::sync::LazyLock;

use super::types::{BLOCK_END, PLAN_DRAFT, PlanDraftPayload, QUESTION, QuestionPayload, Signal};
use crate::errors::PayloadError;

// Compile block regexes once using LazyLock
static QUESTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(QUESTION),
        regex::escape(BLOCK_END)
    ))
    .unwrap()
});

static PLAN_DRAFT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(PLAN_DRAFT),
        regex::escape(BLOCK_END)
    ))
    .unwrap()
});

const QUESTION_KIND: &str = "question";
const PLAN_DRAFT_KIND: &str = "plan draft";

/// Scan `text` for sentinel markers.
///
/// Markers are checked in [`Signal::PRIORITY`] order; the first marker
/// present anywhere in the text wins, even if another marker occurs at an
/// earlier byte position.
pub fn detect_signal(text: &str) -> Option<Signal> {
    Signal::PRIORITY
        .into_iter()
        .find(|signal| text.contains(signal.marker()))
}

/// Extract and decode the JSON body of a `QUESTION` block.
///
/// Returns [`PayloadError::Absent`] when no complete marker pair exists and
/// [`PayloadError::Malformed`] when a block is present but its JSON is
/// invalid, is missing required fields, or has an empty question/options.
pub fn parse_question_payload(text: &str) -> Result<QuestionPayload, PayloadError> {
    let caps = QUESTION_BLOCK.captures(text).ok_or(PayloadError::Absent {
        kind: QUESTION_KIND,
    })?;
    let body = caps.get(1).map_or("", |m| m.as_str());

    let payload: QuestionPayload =
        serde_json::from_str(body).map_err(|e| PayloadError::Malformed {
            kind: QUESTION_KIND,
            reason: e.to_string(),
        })?;

    if payload.question.trim().is_empty() {
        return Err(PayloadError::Malformed {
            kind: QUESTION_KIND,
            reason: "question is empty".to_string(),
        });
    }
    if payload.options.is_empty() {
        return Err(PayloadError::Malformed {
            kind: QUESTION_KIND,
            reason: "options list is empty".to_string(),
        });
    }

    Ok(payload)
}

/// Extract the markdown body of a `PLAN_DRAFT` block.
///
/// Mirrors the two-tier contract of [`parse_question_payload`]: a missing
/// marker pair is `Absent`, an empty body is `Malformed`.
pub fn parse_plan_draft_payload(text: &str) -> Result<PlanDraftPayload, PayloadError> {
    let caps = PLAN_DRAFT_BLOCK.captures(text).ok_or(PayloadError::Absent {
        kind: PLAN_DRAFT_KIND,
    })?;
    let body = caps.get(1).map_or("", |m| m.as_str());

    if body.is_empty() {
        return Err(PayloadError::Malformed {
            kind: PLAN_DRAFT_KIND,
            reason: "draft block is empty".to_string(),
        });
    }

    Ok(PlanDraftPayload {
        markdown: body.to_string(),
    })
}
