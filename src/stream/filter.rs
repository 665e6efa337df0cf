//! Noise filter for the reviewer's diagnostic stream.
//!
//! The reviewer CLI writes a config banner, per-step progress noise, and a
//! labeled final answer to stderr. Live display only wants the shape of the
//! run: the banner verbatim, bold summary lines while it works, and the
//! final answer with the bold markup removed.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::ParsedStream;

/// Label the reviewer prints before its final answer.
const DETAIL_MARKER: &str = "codex";

/// Trimmed line of eight or more dashes.
fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 8 && trimmed.chars().all(|c| c == '-')
}

fn is_emphasized(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 4 && trimmed.starts_with("**") && trimmed.ends_with("**")
}

fn strip_emphasis(line: &str) -> String {
    line.replace("**", "")
}

#[derive(Clone, Copy)]
enum Section {
    /// Config banner, bounded by the separator seen twice.
    Header { separators: u8 },
    /// Progress noise; only emphasized summary lines matter.
    Body,
    /// Final answer, after the marker label.
    Detail,
}

struct NoiseFilter {
    section: Section,
    last: Option<String>,
}

impl NoiseFilter {
    fn new() -> Self {
        Self {
            section: Section::Header { separators: 0 },
            last: None,
        }
    }

    /// Feed one raw line; returns the line to relay, if any.
    fn push(&mut self, line: &str) -> Option<String> {
        let candidate = match self.section {
            Section::Header { separators } => {
                if is_separator(line) {
                    let seen = separators + 1;
                    self.section = if seen == 2 {
                        Section::Body
                    } else {
                        Section::Header { separators: seen }
                    };
                }
                Some(line.to_string())
            }
            Section::Body => {
                if line.trim() == DETAIL_MARKER {
                    self.section = Section::Detail;
                    None
                } else if is_emphasized(line) {
                    Some(line.to_string())
                } else {
                    None
                }
            }
            Section::Detail => Some(strip_emphasis(line)),
        };

        // Suppress consecutive duplicates; separators are exempt
        let candidate = candidate?;
        if !is_separator(&candidate) && self.last.as_deref() == Some(candidate.as_str()) {
            return None;
        }
        self.last = Some(candidate.clone());
        Some(candidate)
    }
}

/// Run the noise filter over a reader to completion.
///
/// `on_line` receives each relayed line. The accumulated output is the
/// relayed text; callers that use this stream for display only are free to
/// discard it and keep just the read error.
pub async fn parse_noise<R, F>(reader: R, mut on_line: F) -> ParsedStream
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut lines = BufReader::new(reader).lines();
    let mut filter = NoiseFilter::new();
    let mut output = String::new();
    let mut error = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error = Some(e);
                break;
            }
        };
        if let Some(relayed) = filter.push(&line) {
            on_line(&relayed);
            output.push_str(&relayed);
            output.push('\n');
        }
    }

    ParsedStream::finish(output, error)
}
