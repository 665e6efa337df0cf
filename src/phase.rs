//! Pipeline phase names used for log tagging.
//!
//! The runner owns the current phase explicitly and passes it into every
//! logger call; nothing here is global state.

use std::fmt;

use console::Color;

/// A named pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Task,
    Review,
    ExternalReview,
    Evaluation,
    Plan,
    Finalize,
}

impl Phase {
    /// Terminal color used for this phase's log tag.
    pub fn color(&self) -> Color {
        match self {
            Phase::Task => Color::Cyan,
            Phase::Review => Color::Magenta,
            Phase::ExternalReview => Color::Yellow,
            Phase::Evaluation => Color::Blue,
            Phase::Plan => Color::Green,
            Phase::Finalize => Color::White,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Task => "task",
            Phase::Review => "review",
            Phase::ExternalReview => "external-review",
            Phase::Evaluation => "evaluation",
            Phase::Plan => "plan",
            Phase::Finalize => "finalize",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_stable() {
        assert_eq!(Phase::Task.to_string(), "task");
        assert_eq!(Phase::ExternalReview.to_string(), "external-review");
        assert_eq!(Phase::Finalize.to_string(), "finalize");
    }

    #[test]
    fn every_phase_has_a_color() {
        for phase in [
            Phase::Task,
            Phase::Review,
            Phase::ExternalReview,
            Phase::Evaluation,
            Phase::Plan,
            Phase::Finalize,
        ] {
            // Color is opaque; this just exercises the mapping.
            let _ = phase.color();
        }
    }
}
