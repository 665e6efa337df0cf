//! Output-stream parsing for tool children.
//!
//! Three parsers share one result contract: accumulate output, detect the
//! first signal marker over the finished transcript, and surface a read
//! error only for genuine I/O failure (end of stream is not an error).
//! Which parser an executor uses depends on what its tool writes: the
//! agent emits stream-json envelopes, the reviewer mixes a config banner
//! and progress noise into stderr, custom scripts print plain text.

mod event;
mod filter;
mod relay;

pub use event::parse_events;
pub use filter::parse_noise;
pub use relay::parse_plain;

use crate::signals::{self, Signal};

/// What a parser hands back once its stream is exhausted.
#[derive(Debug, Default)]
pub struct ParsedStream {
    /// Accumulated transcript, or the tool's final result when it sends one.
    pub output: String,
    /// First completion marker found in the output, by protocol priority.
    pub signal: Option<Signal>,
    /// Read failure, with whatever partial output preceded it.
    pub error: Option<std::io::Error>,
}

impl ParsedStream {
    fn finish(output: String, error: Option<std::io::Error>) -> Self {
        let signal = signals::detect_signal(&output);
        Self {
            output,
            signal,
            error,
        }
    }
}
