//! Human input collection for the interactive plan loop.
//!
//! The runner only sees the [`InputCollector`] trait; the console
//! implementation lives here, tests substitute a scripted one.

use anyhow::Result;
use dialoguer::{Input, Select, theme::ColorfulTheme};

use crate::signals::{PlanDraftPayload, QuestionPayload};

/// Verdict on a plan draft.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftDecision {
    Accept,
    Revise(String),
    Reject,
}

pub trait InputCollector: Send + Sync {
    /// Present a tool question and return the chosen answer.
    fn ask_question(&self, payload: &QuestionPayload) -> Result<String>;

    /// Show a plan draft and collect accept/revise/reject.
    fn ask_draft_review(&self, draft: &PlanDraftPayload) -> Result<DraftDecision>;
}

/// Interactive implementation backed by the terminal.
pub struct ConsoleInput;

impl InputCollector for ConsoleInput {
    fn ask_question(&self, payload: &QuestionPayload) -> Result<String> {
        println!();
        if let Some(context) = &payload.context {
            println!("  {}", console::style(context).dim());
        }

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(&payload.question)
            .items(&payload.options)
            .default(0)
            .interact()?;

        Ok(payload.options[selection].clone())
    }

    fn ask_draft_review(&self, draft: &PlanDraftPayload) -> Result<DraftDecision> {
        println!();
        println!("{}", console::style("Proposed plan draft:").bold());
        println!("{}", draft.markdown);
        println!();

        let options = &[
            "Accept the draft",
            "Request changes",
            "Reject and abort the run",
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Apply this plan?")
            .items(options)
            .default(0)
            .interact()?;

        match selection {
            0 => Ok(DraftDecision::Accept),
            1 => {
                let feedback: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("What should change?")
                    .interact_text()?;
                Ok(DraftDecision::Revise(feedback))
            }
            2 => Ok(DraftDecision::Reject),
            _ => unreachable!(),
        }
    }
}
